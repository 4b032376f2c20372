use std::path::PathBuf;
use std::sync::Arc;

use tidecast_queue::JobQueue;
use tidecast_store::TimeSeriesStore;

pub struct AppState {
    pub store: Arc<dyn TimeSeriesStore>,
    pub queue: Arc<dyn JobQueue>,
    pub upload_dir: PathBuf,
}
