//! TypedRegistry - Handler の登録と管理
//!
//! - `register::<T, _>(handler)` で登録、内部で `TypedHandler` に包んで型消去
//! - `HashMap<String, Arc<dyn DynHandler>>` で管理
//! - `job_types()` はワーカーが claim する job_type の集合になる

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::job::JobPayload;
use crate::domain::JobType;

#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for job type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid job type '{0}'")]
    InvalidJobType(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: JobPayload, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let job_type = JobType::new(T::TYPE)
            .map_err(|_| RegistryError::InvalidJobType(T::TYPE.to_string()))?
            .to_string();
        if self.handlers.contains_key(&job_type) {
            return Err(RegistryError::AlreadyRegistered(job_type));
        }
        self.handlers
            .insert(job_type, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// 登録済み job_type（ソート済み）
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
