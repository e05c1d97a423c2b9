//! Launch geometry for the two-dimensional image kernel.

use std::fmt;

/// Global and optional local work sizes for a 2-D kernel launch.
///
/// When `local` is `None` the runtime picks the work-group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchDims {
    pub global: [usize; 2],
    pub local: Option<[usize; 2]>,
}

impl LaunchDims {
    /// Global size `(width, height)` with runtime-chosen local sizing.
    pub fn new(width: usize, height: usize) -> Self {
        Self { global: [width, height], local: None }
    }

    pub fn with_local(mut self, local: Option<[usize; 2]>) -> Self {
        self.local = local;
        self
    }

    pub fn width(&self) -> usize {
        self.global[0]
    }

    pub fn height(&self) -> usize {
        self.global[1]
    }

    /// Number of work items, one per pixel. `None` on overflow.
    pub fn elements(&self) -> Option<usize> {
        self.global[0].checked_mul(self.global[1])
    }

    /// Size in bytes of one `f32` image covering the global range.
    pub fn image_bytes(&self) -> Option<usize> {
        self.elements()?.checked_mul(std::mem::size_of::<f32>())
    }

    /// Whether the local size (if any) evenly tiles the global size.
    pub fn local_divides_global(&self) -> bool {
        match self.local {
            None => true,
            Some(local) => local
                .iter()
                .zip(self.global.iter())
                .all(|(&l, &g)| l > 0 && g % l == 0),
        }
    }
}

impl fmt::Display for LaunchDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.global[0], self.global[1])?;
        if let Some([lx, ly]) = self.local {
            write!(f, " (local {lx}x{ly})")?;
        }
        Ok(())
    }
}

/// Parse a `WxH` pair such as `16x16`.
pub fn parse_pair(text: &str) -> Result<[usize; 2], String> {
    let (w, h) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{text}'"))?;
    let w = w.trim().parse::<usize>().map_err(|e| format!("invalid width '{w}': {e}"))?;
    let h = h.trim().parse::<usize>().map_err(|e| format!("invalid height '{h}': {e}"))?;
    Ok([w, h])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_launch_has_no_local_size() {
        let dims = LaunchDims::new(1024, 768);
        assert_eq!(dims.global, [1024, 768]);
        assert!(dims.local.is_none());
        assert!(dims.local_divides_global());
    }

    #[test]
    fn image_bytes_is_four_bytes_per_pixel() {
        assert_eq!(LaunchDims::new(2, 2).image_bytes(), Some(16));
        assert_eq!(LaunchDims::new(1024, 1024).image_bytes(), Some(4 * 1024 * 1024));
    }

    #[test]
    fn image_bytes_overflow_is_none() {
        assert_eq!(LaunchDims::new(usize::MAX, 2).image_bytes(), None);
    }

    #[test]
    fn local_size_must_tile_global() {
        let dims = LaunchDims::new(64, 32).with_local(Some([16, 8]));
        assert!(dims.local_divides_global());
        let dims = LaunchDims::new(64, 30).with_local(Some([16, 8]));
        assert!(!dims.local_divides_global());
        let dims = LaunchDims::new(64, 32).with_local(Some([0, 8]));
        assert!(!dims.local_divides_global());
    }

    #[test]
    fn display_includes_local_when_set() {
        assert_eq!(LaunchDims::new(8, 4).to_string(), "8x4");
        assert_eq!(LaunchDims::new(8, 4).with_local(Some([4, 2])).to_string(), "8x4 (local 4x2)");
    }

    #[test]
    fn parse_pair_accepts_both_separators() {
        assert_eq!(parse_pair("16x8"), Ok([16, 8]));
        assert_eq!(parse_pair("16X8"), Ok([16, 8]));
        assert!(parse_pair("16").is_err());
        assert!(parse_pair("ax8").is_err());
    }
}
