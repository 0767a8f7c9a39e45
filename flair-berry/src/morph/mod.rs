//! 形态学操作.
//!
//! 包括二维结构元、逐切片的二值腐蚀/膨胀/孔洞填充,
//! 以及三维连通域标记.

mod binary;
mod disk;
mod label;

pub use disk::StructElem;

pub use label::{largest_region, Connectivity, LabelMap, BACKGROUND_ID};
