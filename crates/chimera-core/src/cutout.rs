use ndarray::Array2;

/// Side length of the archival object cutout.
pub const CUTOUT_SIZE: usize = 51;

const CUTOUT_HALF: i64 = (CUTOUT_SIZE as i64 - 1) / 2;

/// Slice a fixed CUTOUT_SIZE x CUTOUT_SIZE window centered on the
/// integer-truncated centroid.
///
/// Edge policy: the window is intersected with the image bounds and any
/// out-of-bounds remainder is zero-filled, keeping every patch in the
/// stack the same size. No wraparound.
pub fn cutout_frame(frame: &Array2<f32>, xcen: f32, ycen: f32) -> Array2<f32> {
    let (height, width) = frame.dim();
    let mut patch = Array2::<f32>::zeros((CUTOUT_SIZE, CUTOUT_SIZE));

    let x0 = xcen as i64 - CUTOUT_HALF;
    let y0 = ycen as i64 - CUTOUT_HALF;

    for row in 0..CUTOUT_SIZE as i64 {
        let src_y = y0 + row;
        if src_y < 0 || src_y >= height as i64 {
            continue;
        }
        for col in 0..CUTOUT_SIZE as i64 {
            let src_x = x0 + col;
            if src_x < 0 || src_x >= width as i64 {
                continue;
            }
            patch[[row as usize, col as usize]] = frame[[src_y as usize, src_x as usize]];
        }
    }

    patch
}
