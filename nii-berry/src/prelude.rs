//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::check::{are_compatible_imgs, check_img_compatibility};
pub use crate::data::{get_img_data, get_img_info, ImageLike, NeuroImage, NiftiHeaderAttr};
pub use crate::error::{Error, Result};

pub use crate::mask::{
    apply_mask, apply_mask_4d, binarise, load_mask, load_mask_data, union_mask, unmask, unmask_4d,
    Mask, MaskedData,
};

pub use crate::dataset::{niftilist_mask_to_array, niftilist_to_array};

pub use crate::storage::{ExportData, Variable, Variables};

pub use crate::rcfile::{rcfile, RcFile, Settings};

pub use crate::commands::{condor_call, JobQueue};
