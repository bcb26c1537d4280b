mod poller;
mod registry;

pub use poller::DevicePoller;
pub use registry::{DeviceRegistry, DeviceState, DeviceView};
