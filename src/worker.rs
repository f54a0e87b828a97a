use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::categorizer::{RuleTables, DEFAULT_RULES};
use crate::commit::{self, CategoryRepository, LedgerSink};
use crate::error::{ImportError, Result};
use crate::importer::{import_document, ParseOutcome};
use crate::models::{Category, ImportStats, RawDocument};
use crate::reviewer::{ImportState, ReviewSession};
use crate::settings::ImportSettings;

/// Runs parse and commit work off the caller's thread and publishes results
/// into a shared `ReviewSession`. One run at a time; results from a run that
/// was cancelled are dropped.
pub struct ImportController<L, C> {
    session: Arc<Mutex<ReviewSession>>,
    ledger: Arc<Mutex<L>>,
    repository: Arc<Mutex<C>>,
    settings: Arc<ImportSettings>,
    rules: RuleTables,
    generation: Arc<AtomicU64>,
}

impl<L, C> ImportController<L, C>
where
    L: LedgerSink + Send + 'static,
    C: CategoryRepository + Send + 'static,
{
    pub fn new(ledger: L, repository: C, settings: ImportSettings) -> Self {
        Self::with_rules(ledger, repository, settings, DEFAULT_RULES)
    }

    pub fn with_rules(ledger: L, repository: C, settings: ImportSettings, rules: RuleTables) -> Self {
        Self {
            session: Arc::new(Mutex::new(ReviewSession::new())),
            ledger: Arc::new(Mutex::new(ledger)),
            repository: Arc::new(Mutex::new(repository)),
            settings: Arc::new(settings),
            rules,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ledger(&self) -> Arc<Mutex<L>> {
        Arc::clone(&self.ledger)
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    pub fn select_file(&self, doc: RawDocument) -> Result<JoinHandle<()>> {
        let file_name = doc.file_name.clone();
        self.select_with(&file_name, move || Ok(doc))
    }

    /// The file is read on the worker, capped at `max_input_bytes`.
    pub fn select_path(&self, path: PathBuf, mime: Option<String>) -> Result<JoinHandle<()>> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        let max_bytes = self.settings.max_input_bytes;
        self.select_with(&file_name, move || RawDocument::open(&path, mime.as_deref(), max_bytes))
    }

    /// Start a parse whose bytes come from `load`, run on the worker thread.
    /// Rejected with `Busy` while another run is in flight.
    pub fn select_with<F>(&self, file_name: &str, load: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<RawDocument> + Send + 'static,
    {
        let generation = {
            let mut session = self.session.lock();
            session.begin_parse(file_name)?;
            self.generation.load(Ordering::SeqCst)
        };

        let session = Arc::clone(&self.session);
        let repository = Arc::clone(&self.repository);
        let settings = Arc::clone(&self.settings);
        let current = Arc::clone(&self.generation);
        let rules = self.rules;

        let handle = thread::Builder::new()
            .name("billport-parse".to_string())
            .spawn(move || {
                let result = parse_job(load, &repository, &settings, &rules);
                let mut session = session.lock();
                if current.load(Ordering::SeqCst) != generation {
                    debug!(generation, "discarding result of a cancelled parse");
                    return;
                }
                let (outcome, categories) = match result {
                    Ok((outcome, categories)) => (Ok(outcome), categories),
                    Err(err) => (Err(err), Vec::new()),
                };
                if let Err(err) = session.finish_parse(outcome, categories) {
                    warn!(error = %err, "could not publish parse result");
                }
            })?;
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    pub fn toggle_one(&self, index: usize) -> Result<()> {
        self.session.lock().toggle_one(index)
    }

    pub fn toggle_all(&self, selected: bool) -> Result<()> {
        self.session.lock().toggle_all(selected)
    }

    pub fn change_category(&self, index: usize, category_id: Option<i64>) -> Result<()> {
        self.session.lock().change_category(index, category_id)
    }

    pub fn stats(&self) -> Option<ImportStats> {
        self.session.lock().stats()
    }

    pub fn snapshot(&self) -> ImportState {
        self.session.lock().state().clone()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// With nothing selected this fails immediately and the session shows
    /// the error; the ledger is never touched.
    pub fn commit(&self) -> Result<JoinHandle<()>> {
        let (preview, generation) = {
            let mut session = self.session.lock();
            (session.begin_commit()?, self.generation.load(Ordering::SeqCst))
        };

        let session = Arc::clone(&self.session);
        let ledger = Arc::clone(&self.ledger);
        let settings = Arc::clone(&self.settings);
        let current = Arc::clone(&self.generation);

        let handle = thread::Builder::new()
            .name("billport-commit".to_string())
            .spawn(move || {
                let result = {
                    let mut ledger = ledger.lock();
                    commit::commit(&preview, &settings, &mut *ledger)
                };
                let mut session = session.lock();
                if current.load(Ordering::SeqCst) != generation {
                    debug!(generation, "discarding result of a cancelled commit");
                    return;
                }
                if let Err(err) = session.finish_commit(result) {
                    warn!(error = %err, "could not publish commit result");
                }
            })?;
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Reset / cancel
    // -----------------------------------------------------------------------

    /// Back to Idle from Preview, Success or Error.
    pub fn reset(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.state().is_in_flight() {
            return Err(ImportError::Busy(session.state().phase()));
        }
        session.reset();
        Ok(())
    }

    /// Abandon whatever is running and return to Idle. A commit already
    /// handed to the ledger still completes there; only its result is dropped.
    pub fn cancel(&self) {
        let mut session = self.session.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(phase = session.state().phase(), generation, "import cancelled");
        session.reset();
    }
}

fn parse_job<F, C>(
    load: F,
    repository: &Mutex<C>,
    settings: &ImportSettings,
    rules: &RuleTables,
) -> Result<(ParseOutcome, Vec<Category>)>
where
    F: FnOnce() -> Result<RawDocument>,
    C: CategoryRepository,
{
    let categories: Vec<Category> = {
        let mut repository = repository.lock();
        repository.ensure_fallback_categories()?;
        repository.categories()?.into_iter().filter(|c| c.is_enabled).collect()
    };
    let doc = load()?;
    let outcome = import_document(&doc, settings, rules, &categories)?;
    Ok((outcome, categories))
}
