use super::DeviceProfile;
use crate::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn save(&self, device: &DeviceProfile) -> Result<(), DomainError>;
    async fn find_all(&self) -> Result<Vec<DeviceProfile>, DomainError>;
}
