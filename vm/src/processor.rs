//! Loaded programs and asynchronous processor loading.

use {
    crate::{
        error::{Result, VmError},
        task::{VmTaskInput, VmTaskOutput},
    },
    log::{info, warn},
    parking_lot::{Mutex, RwLock},
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
        thread,
    },
    synod_types::HashValue,
};

/// One loaded program bound to a program hash.
///
/// `run` must be a pure function of its input: no wall clock, no I/O, no
/// randomness. Determinism across committee members is what makes
/// essence hashes agree.
pub trait Processor: Send + Sync {
    fn run(&self, input: &VmTaskInput) -> Result<VmTaskOutput>;
}

/// Produces processors for program hashes. The production factory fetches
/// and instantiates program binaries; tests plug in a constant one.
pub trait ProcessorFactory: Send + Sync {
    fn load(&self, program_hash: &HashValue) -> Result<Arc<dyn Processor>>;
}

/// Directory of loaded processors with asynchronous loading.
pub struct ProcessorRegistry {
    factory: Arc<dyn ProcessorFactory>,
    processors: RwLock<HashMap<HashValue, Arc<dyn Processor>>>,
    loading: Mutex<HashSet<HashValue>>,
}

impl ProcessorRegistry {
    pub fn new(factory: Arc<dyn ProcessorFactory>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            processors: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashSet::new()),
        })
    }

    /// True iff a processor for the hash is loaded and ready.
    pub fn check(&self, program_hash: &HashValue) -> bool {
        self.processors.read().contains_key(program_hash)
    }

    /// The loaded processor, if ready.
    pub fn get(&self, program_hash: &HashValue) -> Option<Arc<dyn Processor>> {
        self.processors.read().get(program_hash).cloned()
    }

    /// Load a processor on a background thread. `on_ready` fires exactly
    /// once with the outcome; duplicate requests while a load is running
    /// are dropped.
    pub fn load_async(
        self: &Arc<Self>,
        program_hash: HashValue,
        on_ready: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        if self.check(&program_hash) {
            on_ready(Ok(()));
            return;
        }
        {
            let mut loading = self.loading.lock();
            if !loading.insert(program_hash) {
                return;
            }
        }

        let registry = self.clone();
        thread::Builder::new()
            .name("synodVmLoader".to_string())
            .spawn(move || {
                let outcome = registry.factory.load(&program_hash);
                registry.loading.lock().remove(&program_hash);
                match outcome {
                    Ok(processor) => {
                        registry
                            .processors
                            .write()
                            .insert(program_hash, processor);
                        info!("processor ready for program {program_hash}");
                        on_ready(Ok(()));
                    }
                    Err(e) => {
                        warn!("processor load failed for {program_hash}: {e}");
                        on_ready(Err(VmError::LoadFailed(e.to_string())));
                    }
                }
            })
            .expect("failed to spawn processor loader thread");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::null::NullFactory,
        std::time::Duration,
        synod_types::hash_data,
    };

    #[test]
    fn test_load_async_inserts_processor() {
        let registry = ProcessorRegistry::new(Arc::new(NullFactory));
        let hash = hash_data(b"prog");
        assert!(!registry.check(&hash));

        let (tx, rx) = crossbeam_channel::bounded(1);
        registry.load_async(hash, move |outcome| {
            tx.send(outcome.is_ok()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(registry.check(&hash));
        assert!(registry.get(&hash).is_some());
    }

    #[test]
    fn test_load_async_already_loaded_fires_immediately() {
        let registry = ProcessorRegistry::new(Arc::new(NullFactory));
        let hash = hash_data(b"prog");
        let (tx, rx) = crossbeam_channel::bounded(2);

        let tx1 = tx.clone();
        registry.load_async(hash, move |_| tx1.send(1).unwrap());
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        registry.load_async(hash, move |_| tx.send(2).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    }

    struct FailingFactory;
    impl ProcessorFactory for FailingFactory {
        fn load(&self, _program_hash: &HashValue) -> Result<Arc<dyn Processor>> {
            Err(VmError::LoadFailed("no such program".into()))
        }
    }

    #[test]
    fn test_load_failure_reported() {
        let registry = ProcessorRegistry::new(Arc::new(FailingFactory));
        let hash = hash_data(b"prog");
        let (tx, rx) = crossbeam_channel::bounded(1);
        registry.load_async(hash, move |outcome| {
            tx.send(outcome.is_err()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(!registry.check(&hash));
    }
}
