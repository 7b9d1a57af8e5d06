use crate::types::{BandSet, MosaicError, MosaicResult, StackedImage, STACK_CHANNELS};
use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Radiometric preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Apply gray-world colour balance after stacking
    pub color_balance: bool,
    /// Match each capture's histograms to the reference capture
    pub histogram_match: bool,
    /// Guard added to channel means before division
    pub epsilon: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            color_balance: true,
            histogram_match: true,
            epsilon: 1e-6,
        }
    }
}

/// Combines the four bands of a capture and corrects its radiometry
#[derive(Debug, Clone, Default)]
pub struct BandStackPreprocessor {
    params: PreprocessParams,
}

impl BandStackPreprocessor {
    /// Create a preprocessor with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preprocessor with custom parameters
    pub fn with_params(params: PreprocessParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PreprocessParams {
        &self.params
    }

    /// Stack red, green, blue and near-infrared into one (rows x cols x 4) array
    pub fn stack(&self, band_set: &BandSet) -> MosaicResult<StackedImage> {
        let (rows, cols) = band_set.shape()?;
        log::debug!("Stacking {} bands of {}x{}", STACK_CHANNELS, cols, rows);

        let views: Vec<ArrayView2<f32>> = band_set.bands().into_iter().map(|(_, band)| band.view()).collect();
        ndarray::stack(Axis(2), &views)
            .map_err(|e| MosaicError::InvalidParameter(format!("Failed to stack bands: {}", e)))
    }

    /// Run the configured corrections: histogram matching (when a reference is
    /// given and matching is enabled) followed by colour balance.
    pub fn preprocess(
        &self,
        image: StackedImage,
        reference: Option<&StackedImage>,
    ) -> MosaicResult<StackedImage> {
        let mut image = image;

        if self.params.histogram_match {
            if let Some(reference) = reference {
                image = self.match_reference(&image, reference)?;
            }
        }

        if self.params.color_balance {
            image = self.color_balance(&image);
        }

        Ok(image)
    }

    /// Gray-world correction: scale each channel so its mean equals the mean of
    /// all channel means, then clip to [0, 1].
    pub fn color_balance(&self, image: &StackedImage) -> StackedImage {
        let channels = image.dim().2;
        let means: Vec<f32> = (0..channels)
            .map(|c| image.index_axis(Axis(2), c).mean().unwrap_or(0.0))
            .collect();

        if means.is_empty() || image.is_empty() {
            return image.clone();
        }

        let gray = means.iter().sum::<f32>() / means.len() as f32;
        let scales: Vec<f32> = means
            .iter()
            .map(|m| gray / (m + self.params.epsilon))
            .collect();
        log::debug!("Gray-world channel means {:?}, scales {:?}", means, scales);

        let mut balanced = image.clone();
        for (c, scale) in scales.iter().enumerate() {
            balanced
                .index_axis_mut(Axis(2), c)
                .mapv_inplace(|v| (v * scale).clamp(0.0, 1.0));
        }
        balanced
    }

    /// Per-channel histogram matching of `image` onto `reference`.
    ///
    /// The output takes its values from the reference distribution and keeps the
    /// rank ordering of `image` within each channel.
    pub fn match_reference(
        &self,
        image: &StackedImage,
        reference: &StackedImage,
    ) -> MosaicResult<StackedImage> {
        let channels = image.dim().2;
        if reference.dim().2 != channels {
            return Err(MosaicError::InvalidParameter(format!(
                "Reference has {} channels, image has {}",
                reference.dim().2,
                channels
            )));
        }
        log::debug!("Matching {} channels to reference histogram", channels);

        let mut matched = image.clone();
        for c in 0..channels {
            let channel = match_channel(image.index_axis(Axis(2), c), reference.index_axis(Axis(2), c));
            matched.index_axis_mut(Axis(2), c).assign(&channel);
        }
        Ok(matched)
    }
}

/// Sorted distinct values with their cumulative quantiles
struct CumulativeHistogram {
    values: Vec<f32>,
    quantiles: Vec<f64>,
}

impl CumulativeHistogram {
    fn from_view(view: ArrayView2<f32>) -> Self {
        let mut sorted: Vec<f32> = view.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let total = sorted.len() as f64;
        let mut values = Vec::new();
        let mut quantiles = Vec::new();
        let mut seen = 0usize;
        for (i, value) in sorted.iter().enumerate() {
            seen += 1;
            let last_of_run = sorted
                .get(i + 1)
                .map_or(true, |next| next.total_cmp(value) != Ordering::Equal);
            if last_of_run {
                values.push(*value);
                quantiles.push(seen as f64 / total);
            }
        }

        Self { values, quantiles }
    }
}

fn match_channel(source: ArrayView2<f32>, template: ArrayView2<f32>) -> Array2<f32> {
    if source.is_empty() || template.is_empty() {
        return source.to_owned();
    }

    let src = CumulativeHistogram::from_view(source);
    let tmpl = CumulativeHistogram::from_view(template);

    let mapped: Vec<f32> = src
        .quantiles
        .iter()
        .map(|&q| interp(q, &tmpl.quantiles, &tmpl.values))
        .collect();

    let mut out = Array2::zeros(source.dim());
    Zip::from(&mut out).and(&source).for_each(|o, &v| {
        let idx = src
            .values
            .binary_search_by(|probe| probe.total_cmp(&v))
            .unwrap_or_else(|insert| insert.min(src.values.len() - 1));
        *o = mapped[idx];
    });
    out
}

/// Piecewise-linear interpolation clamped to the end values of `fp`
fn interp(x: f64, xp: &[f64], fp: &[f32]) -> f32 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }

    let j = xp.partition_point(|&v| v <= x) - 1;
    let span = xp[j + 1] - xp[j];
    if span <= 0.0 {
        return fp[j];
    }
    let t = (x - xp[j]) / span;
    (fp[j] as f64 + t * (fp[j + 1] as f64 - fp[j] as f64)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn band(rows: usize, cols: usize, value: f32) -> Array2<f32> {
        Array2::from_elem((rows, cols), value)
    }

    #[test]
    fn test_stack_order() {
        let set = BandSet::new(band(2, 3, 0.1), band(2, 3, 0.2), band(2, 3, 0.3), band(2, 3, 0.4));
        let stacked = BandStackPreprocessor::new().stack(&set).unwrap();

        assert_eq!(stacked.dim(), (2, 3, 4));
        assert_relative_eq!(stacked[[1, 2, 0]], 0.1);
        assert_relative_eq!(stacked[[1, 2, 1]], 0.2);
        assert_relative_eq!(stacked[[1, 2, 2]], 0.3);
        assert_relative_eq!(stacked[[1, 2, 3]], 0.4);
    }

    #[test]
    fn test_stack_shape_mismatch() {
        let set = BandSet::new(band(2, 3, 0.1), band(2, 3, 0.2), band(2, 3, 0.3), band(3, 3, 0.4));
        let result = BandStackPreprocessor::new().stack(&set);
        assert!(matches!(result, Err(MosaicError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_color_balance_equalises_means() {
        let set = BandSet::new(band(4, 4, 0.2), band(4, 4, 0.4), band(4, 4, 0.6), band(4, 4, 0.4));
        let pre = BandStackPreprocessor::new();
        let balanced = pre.color_balance(&pre.stack(&set).unwrap());

        for c in 0..4 {
            let mean = balanced.index_axis(Axis(2), c).mean().unwrap();
            assert_relative_eq!(mean, 0.4, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_color_balance_clips_and_handles_dark_channel() {
        let mut image = Array3::<f32>::zeros((2, 2, 4));
        image.index_axis_mut(Axis(2), 0).fill(0.9);
        image[[0, 0, 1]] = 1.0;
        let balanced = BandStackPreprocessor::new().color_balance(&image);

        assert!(balanced.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
        // All-zero channels stay zero instead of blowing up
        assert_eq!(balanced[[1, 1, 3]], 0.0);
    }

    #[test]
    fn test_match_reference_range_and_rank() {
        let image = Array3::from_shape_fn((4, 4, 4), |(y, x, _)| (y * 4 + x) as f32 / 100.0);
        let reference = Array3::from_shape_fn((3, 5, 4), |(y, x, _)| 0.5 + (y * 5 + x) as f32 / 50.0);
        let matched = BandStackPreprocessor::new().match_reference(&image, &reference).unwrap();

        let ref_min = reference.iter().cloned().fold(f32::INFINITY, f32::min);
        let ref_max = reference.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        for c in 0..4 {
            let src = image.index_axis(Axis(2), c);
            let out = matched.index_axis(Axis(2), c);
            for (a, oa) in src.iter().zip(out.iter()) {
                assert!(*oa >= ref_min - 1e-6 && *oa <= ref_max + 1e-6);
                for (b, ob) in src.iter().zip(out.iter()) {
                    if a < b {
                        assert!(oa <= ob);
                    }
                }
            }
        }
        // Highest source value maps onto the highest reference value
        assert_relative_eq!(matched[[3, 3, 0]], ref_max, epsilon = 1e-6);
    }

    #[test]
    fn test_match_reference_channel_count() {
        let image = Array3::<f32>::zeros((2, 2, 4));
        let reference = Array3::<f32>::zeros((2, 2, 3));
        assert!(BandStackPreprocessor::new().match_reference(&image, &reference).is_err());
    }

    #[test]
    fn test_preprocess_respects_switches() {
        let image = Array3::from_shape_fn((2, 2, 4), |(_, _, c)| 0.1 * (c + 1) as f32);
        let pre = BandStackPreprocessor::with_params(PreprocessParams {
            color_balance: false,
            histogram_match: false,
            ..Default::default()
        });
        let out = pre.preprocess(image.clone(), Some(&Array3::ones((2, 2, 4)))).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_interp_clamps() {
        let xp = [0.25, 0.5, 1.0];
        let fp = [1.0, 2.0, 4.0];
        assert_relative_eq!(interp(0.0, &xp, &fp), 1.0);
        assert_relative_eq!(interp(0.75, &xp, &fp), 3.0);
        assert_relative_eq!(interp(2.0, &xp, &fp), 4.0);
    }
}
