// Options structs
//
// Every create_* call takes one of these by reference. All fields are public
// and independently defaulted, so callers use struct update syntax:
// `BufferOptions { size: 64, ..Default::default() }`.

pub mod acceleration_structure;
pub mod adapter;
pub mod bind_group;
pub mod commands;
pub mod device;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;

pub use acceleration_structure::*;
pub use adapter::*;
pub use bind_group::*;
pub use commands::*;
pub use device::*;
pub use instance::*;
pub use memory::*;
pub use pipeline::*;
pub use render_pass::*;
pub use swapchain::*;
pub use sync::*;
