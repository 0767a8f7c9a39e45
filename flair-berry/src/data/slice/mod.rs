//! 脑掩膜切片对象的操作.

mod core;
mod save;

pub use core::{MaskSlice, MaskSliceMut};

pub use save::ImgWriteVis;
