//! No-data aware reductions over pixel values.

/// Pixel count, sum and mean of the valid pixels of a raster.
///
/// With no valid pixels all three fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterStats {
    /// Number of valid pixels.
    pub count: u64,
    /// Sum of valid pixel values.
    pub sum: f64,
    /// Mean of valid pixel values.
    pub mean: f64,
}

impl RasterStats {
    /// Reduce `values`, skipping the `nodata` sentinel and NaN.
    pub fn from_values<'a, I>(values: I, nodata: f64) -> Self
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let (count, sum) = values
            .into_iter()
            .filter(|&&v| is_valid(v, nodata))
            .fold((0u64, 0.0f64), |(n, s), &v| (n + 1, s + v as f64));

        if count == 0 {
            return Self::default();
        }
        Self {
            count,
            sum,
            mean: sum / count as f64,
        }
    }

    /// True when no pixel was valid.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// True if `value` takes part in statistics.
pub fn is_valid(value: f32, nodata: f64) -> bool {
    !value.is_nan() && value != nodata as f32
}

/// Fixed-width histogram of valid pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Lower edge of the first bin.
    pub min: f64,
    /// Upper edge of the last bin.
    pub max: f64,
    /// Pixel count per bin.
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Count `values` into `bins` equal bins spanning `[min, max]`.
    ///
    /// Values outside the range are ignored; `max` itself falls in the last
    /// bin. An empty or inverted range leaves every bin at zero.
    pub fn from_values<'a, I>(values: I, nodata: f64, min: f64, max: f64, bins: usize) -> Self
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let mut counts = vec![0u64; bins];
        if bins > 0 && max > min {
            let width = (max - min) / bins as f64;
            for &v in values.into_iter().filter(|&&v| is_valid(v, nodata)) {
                let v = v as f64;
                if v < min || v > max {
                    continue;
                }
                let bin = (((v - min) / width) as usize).min(bins - 1);
                counts[bin] += 1;
            }
        }
        Self { min, max, counts }
    }

    /// Width of one bin.
    pub fn bin_width(&self) -> f64 {
        if self.counts.is_empty() {
            0.0
        } else {
            (self.max - self.min) / self.counts.len() as f64
        }
    }

    /// Lower edge of every bin.
    pub fn lower_edges(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..self.counts.len())
            .map(|i| self.min + i as f64 * width)
            .collect()
    }

    /// Number of values counted.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
