// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Summary statistics of an image. NaN pixels (blanked by the imager) are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStatistics {
    pub max: f64,
    pub min: f64,
    pub sum: f64,
    pub stddev: f64,
}

impl ImageStatistics {
    /// Returns `None` if no pixel is finite.
    pub fn from_pixels(pixels: &[f32]) -> Option<ImageStatistics> {
        let mut count = 0_usize;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let mut sum = 0.0;
        for &p in pixels.iter().filter(|p| !p.is_nan()) {
            let p = f64::from(p);
            count += 1;
            max = max.max(p);
            min = min.min(p);
            sum += p;
        }
        if count == 0 {
            return None;
        }

        let mean = sum / count as f64;
        let variance = pixels
            .iter()
            .filter(|p| !p.is_nan())
            .map(|&p| (f64::from(p) - mean).powi(2))
            .sum::<f64>()
            / count as f64;
        Some(ImageStatistics {
            max,
            min,
            sum,
            stddev: variance.sqrt(),
        })
    }

    /// The larger of `|max/min|` and `|min/max|`. A dirty map of pure noise
    /// gives a ratio near 1; emission pushes it up.
    pub fn max_min_ratio(&self) -> f64 {
        let max_min = (self.max / self.min).abs();
        let min_max = (self.min / self.max).abs();
        match (max_min.is_nan(), min_max.is_nan()) {
            (true, true) => f64::NAN,
            (true, false) => min_max,
            (false, true) => max_min,
            (false, false) => max_min.max(min_max),
        }
    }
}
