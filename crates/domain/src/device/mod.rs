mod device_id;
mod profile;
mod protocol;
mod repository;
mod status;

pub use device_id::DeviceId;
pub use profile::DeviceProfile;
pub use protocol::Protocol;
pub use repository::DeviceRepository;
pub use status::DeviceStatus;
