use std::sync::Arc;

use apm_core::config::Config;
use tracing::debug;

use crate::sampler::AdaptiveSampler;
use crate::transaction::{FinishedTransaction, Transaction, TransactionKind};

pub trait TransactionListener: Send + Sync {
    fn on_transaction_finished(&self, transaction: &FinishedTransaction);
}

#[derive(Clone)]
pub struct Tracer {
    config: Arc<Config>,
    sampler: Arc<AdaptiveSampler>,
    listeners: Arc<[Arc<dyn TransactionListener>]>,
}

impl Tracer {
    pub fn new(config: Config) -> Self {
        let sampler = Arc::new(AdaptiveSampler::new(config.sampling_target));
        Self {
            config: Arc::new(config),
            sampler,
            listeners: Arc::from(Vec::new()),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn TransactionListener>) -> Self {
        let mut listeners: Vec<_> = self.listeners.iter().cloned().collect();
        listeners.push(listener);
        self.listeners = Arc::from(listeners);
        self
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn sampler(&self) -> &Arc<AdaptiveSampler> {
        &self.sampler
    }

    pub fn start_transaction(&self, kind: TransactionKind) -> Transaction {
        let transaction = Transaction::with_listeners(
            kind,
            self.config.clone(),
            self.sampler.clone(),
            self.listeners.clone(),
        );
        debug!(transaction = %transaction.id(), kind = %kind, "transaction started");
        transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl TransactionListener for Collect {
        fn on_transaction_finished(&self, transaction: &FinishedTransaction) {
            self.0.lock().unwrap().push(transaction.name.clone());
        }
    }

    #[test]
    fn listeners_see_finished_transactions() {
        let collect = Arc::new(Collect::default());
        let tracer = Tracer::new(Config::default()).with_listener(collect.clone());

        let mut tx = tracer.start_transaction(TransactionKind::Web);
        tx.set_name("Uri/health");
        tx.end();

        let mut ignored = tracer.start_transaction(TransactionKind::Background);
        ignored.set_ignored(true);
        ignored.end();

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec!["WebTransaction/Uri/health".to_string()]
        );
    }

    #[test]
    fn transactions_share_the_sampler() {
        let tracer = Tracer::new(Config {
            sampling_target: 1,
            ..Config::default()
        });
        let mut first = tracer.start_transaction(TransactionKind::Web);
        let mut second = tracer.start_transaction(TransactionKind::Web);
        assert!(first.sampled());
        assert!(!second.sampled());
    }
}
