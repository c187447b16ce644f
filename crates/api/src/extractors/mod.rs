pub mod device;

pub use device::DeviceId;
