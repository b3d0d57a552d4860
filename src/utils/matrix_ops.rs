use faer::Mat;

#[must_use]
pub fn select_row(matrix: &Mat<f64>, row: usize) -> Mat<f64> {
    Mat::from_fn(matrix.ncols(), 1, |j, _| matrix[(row, j)])
}

/// Stack two matrices with the same column count on top of each other.
#[must_use]
pub fn stack_rows(top: &Mat<f64>, bottom: &Mat<f64>) -> Mat<f64> {
    let split = top.nrows();
    Mat::from_fn(split + bottom.nrows(), top.ncols(), |i, j| {
        if i < split {
            top[(i, j)]
        } else {
            bottom[(i - split, j)]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::usize_to_f64;

    #[test]
    fn stack_rows_preserves_order() {
        let top = Mat::from_fn(1, 2, |_, j| if j == 0 { 1.0 } else { 2.0 });
        let bottom = Mat::from_fn(2, 2, |i, j| {
            10.0f64.mul_add(usize_to_f64(i + 1), usize_to_f64(j))
        });
        let stacked = stack_rows(&top, &bottom);
        assert_eq!(stacked.nrows(), 3);
        assert!((stacked[(0, 1)] - 2.0).abs() < 1e-12);
        assert!((stacked[(2, 0)] - 20.0).abs() < 1e-12);
        let row = select_row(&stacked, 1);
        assert_eq!(row.nrows(), 2);
        assert!((row[(1, 0)] - 11.0).abs() < 1e-12);
    }
}
