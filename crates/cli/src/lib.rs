// GridSift CLI library: table rendering and text helpers shared by the
// `gsift` binary and its tests

pub mod table;
pub mod util;
