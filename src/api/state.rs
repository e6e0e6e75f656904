// Explicit service bundle built once at startup and handed to every
// handler through axum state.

use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::database::Database;
use crate::services::chunking::ChunkingService;
use crate::services::embedding::EmbeddingService;
use crate::services::extraction::ExtractionService;
use crate::services::graph::GraphService;
use crate::services::ingestion::IngestionService;
use crate::services::search::SearchService;
use crate::services::snapshot::SnapshotService;
use crate::services::vector::VectorService;

pub struct AppState {
    pub settings: Settings,
    pub db: Database,
    pub graph: GraphService,
    pub vector: VectorService,
    pub search: SearchService,
    pub snapshot: SnapshotService,
    pub ingestion: IngestionService,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub async fn initialize(
        settings: Settings,
    ) -> Result<SharedState, Box<dyn std::error::Error + Send + Sync>> {
        let db = Database::connect(&settings).await?;

        let graph = GraphService::new(db.clone());
        let vector = VectorService::new(&settings)?;
        let embedding = EmbeddingService::new(&settings);
        let extraction = ExtractionService::new(&settings);
        let chunking = Arc::new(ChunkingService::new(
            settings.chunk_size,
            settings.chunk_overlap,
        ));

        let search = SearchService::new(db.clone(), vector.clone(), embedding.clone());
        let snapshot = SnapshotService::new(db.clone(), graph.clone());
        snapshot.ensure_table().await?;

        let ingestion = IngestionService::new(
            db.clone(),
            vector.clone(),
            embedding,
            extraction,
            graph.clone(),
            chunking,
        );

        info!(
            postgres = %settings.postgres_host,
            qdrant = %settings.qdrant_url,
            "Services initialized"
        );

        Ok(Arc::new(AppState {
            settings,
            db,
            graph,
            vector,
            search,
            snapshot,
            ingestion,
        }))
    }
}
