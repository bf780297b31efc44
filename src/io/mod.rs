// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! File stuff (FITS images, globs).

mod fits;
mod glob;

pub(crate) use self::fits::{
    fits_create_image, fits_get_image, fits_get_image_shape, fits_open, fits_open_hdu,
    fits_read_header_cards, fits_write_image, fits_write_key, FitsError,
};
pub(crate) use self::glob::{get_all_matches_from_glob, get_single_match_from_glob, GlobError};
