use crate::assistant::confirm::ConversationStore;
use crate::assistant::llm::{LlmClient, LlmError};
use crate::auth::AdminGuard;
use crate::errors::ApiError;
use crate::persist::SaveFile;
use crate::settings::Settings;
use crate::world::{Command, Event, World};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
#[cfg(feature = "profile")]
use std::time::Instant;

// ── Shared state ───────────────────────────────────────────────

pub struct AppState {
    pub world: RwLock<World>,
    pub save_file: SaveFile,
    pub settings: Settings,
    pub admin: AdminGuard,
    /// `None` until an API key is known; the assistant then runs on rules only.
    pub llm: RwLock<Option<LlmClient>>,
    pub conversations: Mutex<ConversationStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(settings: Settings, save_file: SaveFile, world: World, admin: AdminGuard) -> Result<Self, LlmError> {
        let llm = match &settings.llm_api_key {
            Some(key) => Some(LlmClient::new(&settings.llm, key.clone())?),
            None => None,
        };
        Ok(AppState {
            world: RwLock::new(world),
            save_file,
            settings,
            admin,
            llm: RwLock::new(llm),
            conversations: Mutex::new(ConversationStore::default()),
        })
    }

    pub fn read_world(&self) -> Result<RwLockReadGuard<'_, World>, ApiError> {
        self.world.read().map_err(ApiError::poisoned("world"))
    }

    /// Apply a command and persist the result, all under the write lock, so
    /// concurrent writers are serialized. The command runs on a copy; the
    /// copy replaces the live world only once the save file accepted it.
    pub fn commit(&self, cmd: Command) -> Result<Event, ApiError> {
        #[cfg(feature = "profile")]
        let start = Instant::now();

        let mut world = self.world.write().map_err(ApiError::poisoned("world"))?;
        let mut next = world.clone();
        let event = next.apply(cmd)?;
        if event.changed() {
            self.save_file.flush(&next)?;
            *world = next;
        }

        #[cfg(feature = "profile")]
        tracing::debug!(elapsed_us = start.elapsed().as_micros() as u64, revision = event.revision(), "commit");
        Ok(event)
    }

    pub fn llm_client(&self) -> Result<Option<LlmClient>, ApiError> {
        Ok(self.llm.read().map_err(ApiError::poisoned("llm"))?.clone())
    }

    pub fn set_llm_key(&self, key: &str) -> Result<(), ApiError> {
        let client = LlmClient::new(&self.settings.llm, key).map_err(|e| ApiError::Internal(e.to_string()))?;
        *self.llm.write().map_err(ApiError::poisoned("llm"))? = Some(client);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::NewTask;
    use chrono::NaiveDate;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let save_file = SaveFile::open(dir.path().join("tasks.json")).unwrap();
        AppState::new(Settings::default(), save_file, World::new(), AdminGuard::disabled()).unwrap()
    }

    #[test]
    fn commit_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let due = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();

        state.commit(Command::CreateTask(NewTask::new("Essay", due))).unwrap();

        let on_disk = state.save_file.load_world().unwrap();
        assert_eq!(on_disk.tasks.len(), 1);
        assert_eq!(state.read_world().unwrap().revision, 1);
    }

    #[test]
    fn failed_flush_leaves_world_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the final rename fail.
        let blocked = dir.path().join("tasks.json");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();
        let save_file = SaveFile::open(&blocked).unwrap();
        let state = AppState::new(Settings::default(), save_file, World::new(), AdminGuard::disabled()).unwrap();

        let due = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        let err = state.commit(Command::CreateTask(NewTask::new("Essay", due))).unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
        assert!(state.read_world().unwrap().tasks.is_empty());
        assert_eq!(state.read_world().unwrap().revision, 0);
    }

    #[test]
    fn llm_key_enables_client() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        assert!(state.llm_client().unwrap().is_none());
        state.set_llm_key("k").unwrap();
        assert!(state.llm_client().unwrap().is_some());
    }
}
