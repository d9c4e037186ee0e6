// Sliding-window output geometry shared by convolution and max-pooling.
//
//   out = (extent + 2*pad - window) / stride + 1
//
// The division has to be exact. A remainder means the last window would hang
// off the edge of the (padded) input; rather than silently dropping those
// rows/columns the kernels reject the configuration.

use sinew_core::{Error, Result};

/// Number of window positions along one spatial axis.
pub(crate) fn output_extent(
    kernel: &'static str,
    axis: &'static str,
    extent: usize,
    pad: usize,
    window: usize,
    stride: usize,
) -> Result<usize> {
    if stride == 0 {
        return Err(Error::config(kernel, "stride must be positive"));
    }
    if window == 0 {
        return Err(Error::config(kernel, format!("{axis} window must be positive")));
    }
    let padded = extent + 2 * pad;
    if padded < window {
        return Err(Error::config(
            kernel,
            format!("{axis} window {window} larger than padded input {padded}"),
        ));
    }
    if (padded - window) % stride != 0 {
        return Err(Error::NonIntegralOutput {
            kernel,
            axis,
            extent: padded,
            window,
            stride,
        });
    }
    Ok((padded - window) / stride + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_geometry() {
        // 32x32, 3x3, pad 1, stride 1 → same size
        assert_eq!(output_extent("conv", "height", 32, 1, 3, 1).unwrap(), 32);
        // 4x4, 2x2 pool, stride 2 → 2
        assert_eq!(output_extent("max_pool", "width", 4, 0, 2, 2).unwrap(), 2);
        // 5, window 3, stride 2 → 2
        assert_eq!(output_extent("conv", "height", 5, 0, 3, 2).unwrap(), 2);
    }

    #[test]
    fn test_non_integral_rejected() {
        // (8 - 3) / 2 is not whole
        let err = output_extent("max_pool", "height", 8, 0, 3, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::NonIntegralOutput {
                extent: 8,
                window: 3,
                stride: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_degenerate_configs() {
        assert!(output_extent("conv", "height", 4, 0, 3, 0).is_err());
        assert!(output_extent("conv", "height", 2, 0, 3, 1).is_err());
        assert!(output_extent("conv", "height", 4, 0, 0, 1).is_err());
    }
}
