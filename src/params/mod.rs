// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters that are kept modular to be used in multiple aspects of
//! `linecube`.
//!
//! The code here is kind of "mirroring" the code within the `cli` module; the
//! idea is that `cli` is unparsed, user-facing code, whereas parameters have
//! been parsed and are ready to be used directly.

mod continuum_image;
mod cube_assemble;
mod line_image;

pub(crate) use continuum_image::ContinuumImageParams;
pub(crate) use cube_assemble::CubeAssembleParams;
pub(crate) use line_image::{CubeOutcome, CubeRequest, LineImagingError, LineImagingParams};
