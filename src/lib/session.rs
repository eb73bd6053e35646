//! Incremental counting.
//!
//! A [`Session`] builds its classifier and worker pool once, then accepts reads in batches,
//! keeping a running [`CountTable`].  Counting every batch of a file through one session gives
//! exactly the table a single [`crate::count::count_fragments`] call over all reads would.

use log::debug;
use rayon::ThreadPool;

use crate::{
    count::{build_thread_pool, count_in_pool, Classifier, Fragment},
    design::{CountOptions, Strand},
    errors::{ConfigError, CountError},
    metrics::CountTable,
};

/// A running count over batches of fragments sharing one classifier and worker pool.
pub struct Session<C: Classifier> {
    classifier: C,
    pool: ThreadPool,
    table: CountTable<C::Key>,
    detailed: bool,
    batches: usize,
}

impl<C: Classifier> Session<C> {
    /// Start a session that counts with `classifier` on `options.threads` workers.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ThreadPool`] if the workers cannot be started
    pub fn setup(classifier: C, options: &CountOptions) -> Result<Self, ConfigError> {
        let pool = build_thread_pool(options.threads())?;
        Ok(Self {
            classifier,
            pool,
            table: CountTable::new(options.diagnostics),
            detailed: options.diagnostics,
            batches: 0,
        })
    }

    /// Count a batch of fragments, adding it to the running table.
    ///
    /// Returns the table for this batch alone.  If the batch fails nothing is added.
    ///
    /// # Errors
    ///
    /// - [`CountError::MissingMate`] if the classifier needs read pairs and a fragment has one
    ///   read; the index is relative to this batch
    pub fn update<F: Fragment>(&mut self, fragments: &[F]) -> Result<CountTable<C::Key>, CountError>
    where
        C::Key: Clone,
    {
        self.update_stranded(fragments, &[])
    }

    /// As [`Session::update`], with `strands` overriding the orientation searched per region.
    ///
    /// # Errors
    ///
    /// - see [`Session::update`]
    pub fn update_stranded<F: Fragment>(
        &mut self,
        fragments: &[F],
        strands: &[Strand],
    ) -> Result<CountTable<C::Key>, CountError>
    where
        C::Key: Clone,
    {
        let batch = count_in_pool(&self.pool, &self.classifier, fragments, strands, self.detailed)?;
        self.table.update_with(batch.clone());
        self.batches += 1;
        debug!(
            "Batch {}: {} fragments, {} in total",
            self.batches,
            batch.diagnostics().total,
            self.table.diagnostics().total
        );
        Ok(batch)
    }

    /// The running table.
    pub fn table(&self) -> &CountTable<C::Key> {
        &self.table
    }

    /// The number of batches counted so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// End the session, returning the counts over every batch.
    pub fn finalize(self) -> CountTable<C::Key> {
        self.table
    }
}
