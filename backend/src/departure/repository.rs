use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::departure::model::{Departure, Tour};

#[async_trait]
pub trait DepartureRepository: Send + Sync {
    async fn insert_tour(&self, tour: &Tour) -> Result<()>;

    async fn fetch_tour(&self, tour_id: &Uuid) -> Result<Option<Tour>>;

    async fn insert(&self, departure: &Departure) -> Result<()>;

    async fn fetch_by_id(&self, departure_id: &Uuid) -> Result<Option<Departure>>;
}
