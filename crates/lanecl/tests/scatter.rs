lanecl_reduce::testgen_scatter!([f32, f64]);
