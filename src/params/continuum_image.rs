// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fs, path::PathBuf};

use log::info;
use vec1::Vec1;

use crate::{
    continuum::{ContinuumImager, ContinuumImagingError, ContinuumParams, ContinuumProduct},
    imaging::{ImagingPrimitive, Miriad},
};

pub(crate) struct ContinuumImageParams {
    pub(crate) datasets: Vec1<PathBuf>,
    /// Everything is made in here.
    pub(crate) cont_dir: PathBuf,
    pub(crate) continuum: ContinuumParams,
    pub(crate) miriad_bin_dir: Option<PathBuf>,
}

impl ContinuumImageParams {
    pub(crate) fn run(&self) -> Result<ContinuumProduct, ContinuumImagingError> {
        fs::create_dir_all(&self.cont_dir)?;
        let miriad = Miriad::new(self.miriad_bin_dir.clone(), self.cont_dir.clone());
        self.run_with(&miriad)
    }

    pub(crate) fn run_with<P: ImagingPrimitive + ?Sized>(
        &self,
        primitive: &P,
    ) -> Result<ContinuumProduct, ContinuumImagingError> {
        info!(
            "Imaging the continuum of {} datasets in {}",
            self.datasets.len(),
            self.cont_dir.display()
        );
        let product = ContinuumImager::new(primitive, &self.continuum).run(&self.datasets)?;
        if let Some(last) = product.cycles.last() {
            info!(
                "Final residual peak {:e} Jy/beam, rms {:e} Jy/beam",
                last.residual_peak, last.residual_rms
            );
        }
        Ok(product)
    }
}
