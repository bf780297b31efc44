// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parsing the diagnostic text printed by map formation.

use regex::Regex;
use thiserror::Error;

lazy_static::lazy_static! {
    static ref RE_VISIBILITIES: Regex =
        Regex::new(r"Visibilities accepted:\s*(\d+)").unwrap();

    static ref RE_RMS_NOISE: Regex =
        Regex::new(r"Theoretical rms noise:\s*(\S+)").unwrap();
}

/// What map formation reported about a single invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvertReport {
    pub visibilities: u64,

    /// Only `None` when there were no visibilities; no noise is reported then.
    pub theoretical_rms_noise: Option<f64>,
}

impl InvertReport {
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<InvertReport, ReportError> {
        let mut visibilities = None;
        let mut rms = None;
        for line in lines {
            let line = line.as_ref();
            if visibilities.is_none() {
                if let Some(c) = RE_VISIBILITIES.captures(line) {
                    visibilities = Some(c[1].parse().map_err(|_| ReportError::BadValue {
                        line: line.to_string(),
                    })?);
                    continue;
                }
            }
            if let Some(c) = RE_RMS_NOISE.captures(line) {
                // The last reported noise wins; it's the one for the final
                // (weighted) map.
                rms = Some(c[1].parse::<f64>().map_err(|_| ReportError::BadValue {
                    line: line.to_string(),
                })?);
            }
        }

        let visibilities = visibilities.ok_or(ReportError::NoVisibilityCount)?;
        if visibilities > 0 && rms.is_none() {
            return Err(ReportError::NoRmsNoise { visibilities });
        }
        Ok(InvertReport {
            visibilities,
            theoretical_rms_noise: rms,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.visibilities == 0
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ReportError {
    #[error("Map formation didn't report how many visibilities it accepted")]
    NoVisibilityCount,

    #[error("Map formation accepted {visibilities} visibilities, but didn't report a theoretical rms noise")]
    NoRmsNoise { visibilities: u64 },

    #[error("Couldn't parse the number in the diagnostic line '{line}'")]
    BadValue { line: String },
}
