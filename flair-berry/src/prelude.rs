//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::slice::{ImgWriteVis, MaskSlice, MaskSliceMut};
pub use crate::data::window::IntensityWindow;
pub use crate::data::{BrainMask, FlairScan, VolumeAttr};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_BRAIN};
pub use crate::consts::{field, ElemType};

pub use crate::error::{BrainError, BrainResult};

pub use crate::morph::{Connectivity, StructElem};
pub use crate::post_proc::{refine_mask, validate_mask, MaskRefiner, Metrics, MetricsSummary};

pub use crate::dataset::{self, home_dataset_dir_with};
