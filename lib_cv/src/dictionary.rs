use std::path::Path;

use log::debug;
use opencv::objdetect::{
    DetectorParameters, Dictionary, PredefinedDictionaryType, get_predefined_dictionary,
};
use opencv::prelude::*;

use crate::error::{Error, Result};
use crate::utils::open_storage_for_read;

/// `DICT_4X4_250`.
pub const DEFAULT_DICTIONARY_ID: i32 = 2;

pub fn predefined_dictionary(id: i32) -> Result<Dictionary> {
    let dict_type =
        PredefinedDictionaryType::try_from(id).map_err(|_| Error::UnknownDictionary(id))?;
    debug!("Using dictionary {:?}", dict_type);
    Ok(get_predefined_dictionary(dict_type)?)
}

/// Detector parameters, optionally overridden by a FileStorage file in the
/// layout written by `DetectorParameters::writeDetectorParameters`.
pub fn load_detector_parameters(path: Option<&Path>) -> Result<DetectorParameters> {
    let mut params = DetectorParameters::default()?;
    let Some(path) = path else {
        return Ok(params);
    };

    let storage = open_storage_for_read(path)
        .ok_or_else(|| Error::DetectorParamsUnavailable(path.to_path_buf()))?;
    let root = storage.root(0)?;
    if !params.read_detector_parameters(&root)? {
        debug!("{} did not override any detector parameter", path.display());
    }
    Ok(params)
}
