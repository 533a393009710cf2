use serde::{Deserialize, Serialize};

use lanecl_common::FloatElement;

/// How sampling locations outside of a level are handled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryMode {
    /// Corners outside the level read zero.
    #[default]
    Zeros,
    /// Locations are clamped to the border of the level.
    Border,
    /// Locations are reflected on the edges of the level, then clamped.
    Reflection,
}

impl BoundaryMode {
    pub fn code(&self) -> u64 {
        match self {
            BoundaryMode::Zeros => 0,
            BoundaryMode::Border => 1,
            BoundaryMode::Reflection => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(BoundaryMode::Zeros),
            1 => Some(BoundaryMode::Border),
            2 => Some(BoundaryMode::Reflection),
            _ => None,
        }
    }
}

/// One of the four grid cells surrounding a sampling location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner<F> {
    /// Row-major position of the cell in its level, `None` when it lies outside.
    pub position: Option<usize>,
    pub weight: F,
}

/// The bilinear footprint of a sampling location.
///
/// Corners are ordered `(low y, low x)`, `(low y, high x)`, `(high y, low x)`, `(high y, high x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilinearSample<F> {
    pub corners: [Corner<F>; 4],
    /// Fractional part of the grid coordinate along x.
    pub fx: F,
    /// Fractional part of the grid coordinate along y.
    pub fy: F,
    /// Derivative of the grid x coordinate with respect to the normalized location.
    pub slope_x: F,
    /// Derivative of the grid y coordinate with respect to the normalized location.
    pub slope_y: F,
}

impl<F: FloatElement> BilinearSample<F> {
    /// Derivatives of the four corner weights along x, in corner order.
    pub fn weight_grad_x(&self) -> [F; 4] {
        let hy = F::one() - self.fy;
        [-hy, hy, -self.fy, self.fy]
    }

    /// Derivatives of the four corner weights along y, in corner order.
    pub fn weight_grad_y(&self) -> [F; 4] {
        let hx = F::one() - self.fx;
        [-hx, -self.fx, hx, self.fx]
    }
}

/// Locates the normalized `(x, y)` on a `height x width` grid whose cell centers sit at half
/// integers.
///
/// Returns `None` when the location reads nothing: with [BoundaryMode::Zeros], a location at one
/// cell or more outside of the grid.
pub fn bilinear<F: FloatElement>(
    mode: BoundaryMode,
    x: F,
    y: F,
    height: usize,
    width: usize,
) -> Option<BilinearSample<F>> {
    if height == 0 || width == 0 {
        return None;
    }

    let half = F::from_f64(0.5);
    let (w, h) = (F::from_f64(width as f64), F::from_f64(height as f64));
    let (x, y) = (x * w - half, y * h - half);

    let ((x, dx), (y, dy)) = match mode {
        BoundaryMode::Zeros => {
            let inside = x > -F::one() && y > -F::one() && x < w && y < h;
            if !inside {
                return None;
            }
            ((x, F::one()), (y, F::one()))
        }
        BoundaryMode::Border => (clip(x, width), clip(y, height)),
        BoundaryMode::Reflection => (reflect(x, width), reflect(y, height)),
    };

    let (low_x, low_y) = (x.floor(), y.floor());
    let (fx, fy) = (x - low_x, y - low_y);
    let (hx, hy) = (F::one() - fx, F::one() - fy);
    let (low_x, low_y) = (low_x.to_f64() as isize, low_y.to_f64() as isize);

    let position = |cy: isize, cx: isize| {
        let inside = (0..height as isize).contains(&cy) && (0..width as isize).contains(&cx);
        inside.then(|| cy as usize * width + cx as usize)
    };
    let corner = |cy: isize, cx: isize, weight: F| Corner {
        position: position(cy, cx),
        weight,
    };

    Some(BilinearSample {
        corners: [
            corner(low_y, low_x, hy * hx),
            corner(low_y, low_x + 1, hy * fx),
            corner(low_y + 1, low_x, fy * hx),
            corner(low_y + 1, low_x + 1, fy * fx),
        ],
        fx,
        fy,
        slope_x: w * dx,
        slope_y: h * dy,
    })
}

// Clamps a grid coordinate into the cell centers, with the slope of the clamp.
fn clip<F: FloatElement>(coordinate: F, size: usize) -> (F, F) {
    let last = F::from_f64((size - 1) as f64);
    if coordinate <= F::zero() {
        (F::zero(), F::zero())
    } else if coordinate >= last {
        (last, F::zero())
    } else {
        (coordinate, F::one())
    }
}

// Reflects a grid coordinate on the outer edges of the grid, `-0.5` and `size - 0.5`, then clamps.
fn reflect<F: FloatElement>(coordinate: F, size: usize) -> (F, F) {
    let low = -F::from_f64(0.5);
    let span = F::from_f64(size as f64);

    let (distance, mut slope) = if coordinate < low {
        (low - coordinate, -F::one())
    } else {
        (coordinate - low, F::one())
    };
    let flips = (distance / span).floor();
    let extra = distance - flips * span;
    let reflected = if flips.to_f64() as u64 % 2 == 0 {
        low + extra
    } else {
        slope = -slope;
        span + low - extra
    };

    let (clipped, clip_slope) = clip(reflected, size);
    (clipped, slope * clip_slope)
}
