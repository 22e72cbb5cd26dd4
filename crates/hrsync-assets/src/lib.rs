//! HR Sync Assets: asset-tracking integration.
//!
//! Maps HR employee notifications onto asset object attributes and upserts
//! them through the asset API. `AssetSyncHandler` is the production
//! `SyncHandler` wired into the worker.

pub mod client;
pub mod handler;
pub mod mapping;

pub use client::{
    AssetAttribute, AssetClient, AssetClientConfig, AssetError, AssetObject, AttributeValue,
    HttpAssetClient, RoleTypeConfig,
};
pub use handler::AssetSyncHandler;
pub use mapping::{AttributeIds, MappedEmployee, MappingError, job_title, map_employee};
