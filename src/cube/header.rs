// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The astrometric and spectral header carried from the first channel image
//! into the cube.

use indexmap::IndexMap;
use log::{debug, trace};

use crate::constants::{HI_REST_FREQ_HZ, RETAINED_AXIS_TYPES, SKY_RESPONSE_AXIS_TYPE};

/// Per-axis keyword stems; the axis number is appended.
const AXIS_KEYS: [&str; 7] = ["NAXIS", "CTYPE", "CRVAL", "CDELT", "CRPIX", "CROTA", "CUNIT"];

/// Keys cfitsio writes itself when a cube is created.
const STRUCTURAL_KEYS: [&str; 6] = ["SIMPLE", "BITPIX", "NAXIS", "EXTEND", "BSCALE", "BZERO"];

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl HeaderValue {
    /// Parse a raw FITS card value. Logical values aren't carried.
    fn parse(raw: &str) -> Option<HeaderValue> {
        let raw = raw.trim();
        if let Some(quoted) = raw.strip_prefix('\'') {
            let inner = quoted.strip_suffix('\'').unwrap_or(quoted);
            return Some(HeaderValue::Str(inner.replace("''", "'").trim_end().to_string()));
        }
        if let Ok(i) = raw.parse() {
            return Some(HeaderValue::Int(i));
        }
        raw.replace(['D', 'd'], "E").parse().ok().map(HeaderValue::Float)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(i) => Some(*i as f64),
            HeaderValue::Float(f) => Some(*f),
            HeaderValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered header cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataHeader {
    cards: IndexMap<String, HeaderValue>,
}

impl MetadataHeader {
    /// Build a header from raw (keyword, value) cards; cards whose value can't
    /// be carried are dropped.
    pub fn from_cards<I: IntoIterator<Item = (String, String)>>(cards: I) -> MetadataHeader {
        let mut header = MetadataHeader::default();
        for (key, raw) in cards {
            match HeaderValue::parse(&raw) {
                Some(value) => {
                    header.cards.insert(key, value);
                }
                None => trace!("Not carrying header card {key} = {raw}"),
            }
        }
        header
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn set(&mut self, key: &str, value: HeaderValue) {
        self.cards.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.cards.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The cards that aren't regenerated when a cube is written.
    pub fn descriptive_cards(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.iter().filter(|(k, _)| !is_structural(k))
    }

    /// The number of axes described, i.e. the largest axis number of any axis
    /// keyword.
    fn num_axes(&self) -> usize {
        self.cards
            .keys()
            .filter_map(|k| {
                AXIS_KEYS
                    .iter()
                    .find_map(|stem| k.strip_prefix(stem))
                    .and_then(|n| n.parse::<usize>().ok())
            })
            .max()
            .unwrap_or(0)
    }

    fn swap_axes(&mut self, a: usize, b: usize) {
        for stem in AXIS_KEYS {
            let key_a = format!("{stem}{a}");
            let key_b = format!("{stem}{b}");
            let value_a = self.cards.get(&key_a).cloned();
            let value_b = self.cards.get(&key_b).cloned();
            match value_b {
                Some(v) => self.set(&key_a, v),
                None => {
                    self.remove(&key_a);
                }
            }
            match value_a {
                Some(v) => self.set(&key_b, v),
                None => {
                    self.remove(&key_b);
                }
            }
        }
    }

    fn remove_axis(&mut self, axis: usize) {
        for stem in AXIS_KEYS {
            self.remove(&format!("{stem}{axis}"));
        }
    }

    /// Correct the header of a channel image so it describes the cube. The
    /// spectral reference value becomes the cube's start frequency and the
    /// rest frequency is set. Then, if a sky-response axis precedes the
    /// frequency axis, the two are swapped; a beam cube therefore keeps the
    /// frequency reference of its channel image. Finally every axis that isn't
    /// a sky position or frequency is dropped.
    pub fn reconcile(&mut self, start_freq_hz: f64) {
        self.set("CRVAL3", HeaderValue::Float(start_freq_hz));
        self.set("RESTFREQ", HeaderValue::Float(HI_REST_FREQ_HZ));

        if self.get_str("CTYPE3") == Some(SKY_RESPONSE_AXIS_TYPE) {
            debug!("Swapping the {SKY_RESPONSE_AXIS_TYPE} and frequency axes");
            self.swap_axes(3, 4);
        }

        for axis in 1..=self.num_axes() {
            let retained = axis <= RETAINED_AXIS_TYPES.len()
                && self
                    .get_str(&format!("CTYPE{axis}"))
                    .map(|t| RETAINED_AXIS_TYPES.contains(&t))
                    .unwrap_or(false);
            if !retained {
                debug!("Pruning header axis {axis}");
                self.remove_axis(axis);
            }
        }
    }
}

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key)
        || key
            .strip_prefix("NAXIS")
            .map(|n| n.parse::<usize>().is_ok())
            .unwrap_or(false)
}
