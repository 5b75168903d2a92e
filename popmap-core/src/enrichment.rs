//! Batched name-based location estimation for sites without a usable configured city.
//!
//! Sites are grouped into bounded batches and sent to an [`EstimatorPort`]. A batch that fails as
//! a whole leaves its sites without an estimate; a response entry that is missing or invalid only
//! affects its own site. Accepted answers go through an [`EstimateCache`] scoped to one run, which
//! keeps coordinates consistent for sites sharing a city and answers repeated queries without a
//! further call.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EnrichmentError;
use crate::geo::{GeoIndex, normalize};
use crate::model::{Coordinate, CountryCode, Site, SiteId};
use crate::ports::{EstimateRequest, EstimatorPort, RawEstimate};

/// Default number of sites sent per estimation call.
pub const DEFAULT_BATCH_SIZE: usize = 25;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Validated estimation result for one site.
pub struct Estimate {
    /// Estimated city.
    pub city: Option<String>,
    /// Coordinate for `city`, either returned directly or taken from the cache.
    pub coordinate: Option<Coordinate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Estimates keyed by site.
pub struct Estimates(HashMap<SiteId, Estimate>);

impl Estimates {
    /// Estimate for a site, if one was accepted.
    #[must_use]
    pub fn get(&self, site: &SiteId) -> Option<&Estimate> {
        self.0.get(site)
    }

    /// Record the estimate for a site.
    pub fn insert(&mut self, site: SiteId, estimate: Estimate) {
        self.0.insert(site, estimate);
    }

    /// Number of sites with an estimate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no site has an estimate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Limits applied to estimation calls.
pub struct EnrichmentOptions {
    /// Maximum sites per call.
    pub batch_size: usize,
    /// Maximum calls in flight at once.
    pub concurrency: usize,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Counters describing one enrichment pass.
pub struct EnrichmentReport {
    /// Sites handed to the batcher.
    pub requested: usize,
    /// Calls made to the estimator.
    pub batches: usize,
    /// Calls that failed as a whole.
    pub failed_batches: usize,
    /// Entries that were missing or invalid.
    pub malformed_entries: usize,
    /// Answers served from the cache, by query or by city.
    pub cache_hits: usize,
    /// Sites that ended up with an estimate.
    pub estimated: usize,
}

type CacheKey = (String, CountryCode);

#[derive(Debug, Default)]
struct CacheState {
    cities: HashMap<CacheKey, Coordinate>,
    queries: HashMap<CacheKey, Estimate>,
}

/// City→coordinate and query→estimate memo shared by all batches of a run.
#[derive(Debug, Default)]
pub struct EstimateCache {
    state: Mutex<CacheState>,
}

impl EstimateCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached coordinate of a city.
    #[must_use]
    pub fn city(&self, city: &str, country: &CountryCode) -> Option<Coordinate> {
        self.lock().cities.get(&(normalize(city), country.clone())).copied()
    }

    /// Number of cities with a cached coordinate.
    #[must_use]
    pub fn city_count(&self) -> usize {
        self.lock().cities.len()
    }

    fn query(&self, key: &CacheKey) -> Option<Estimate> {
        self.lock().queries.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn query_key(name: &str, country: &CountryCode) -> CacheKey {
    (normalize(name), country.clone())
}

struct BatchResult {
    failed: bool,
    accepted: Vec<(SiteId, Estimate)>,
    malformed: usize,
    cache_hits: usize,
}

/// Runs estimation batches for the sites the configured-city tier could not place.
pub struct EnrichmentBatcher<'run> {
    estimator: &'run dyn EstimatorPort,
    index: &'run GeoIndex,
    cache: &'run EstimateCache,
    options: EnrichmentOptions,
}

impl<'run> EnrichmentBatcher<'run> {
    /// Create a batcher; `cache` must live for the whole run.
    #[must_use]
    pub fn new(
        estimator: &'run dyn EstimatorPort,
        index: &'run GeoIndex,
        cache: &'run EstimateCache,
        options: EnrichmentOptions,
    ) -> Self {
        Self {
            estimator,
            index,
            cache,
            options,
        }
    }

    /// Estimate locations for `sites`.
    ///
    /// Never fails: batch and entry failures are logged, counted, and leave the affected sites
    /// without an estimate.
    pub async fn enrich(&self, sites: &[&Site]) -> (Estimates, EnrichmentReport) {
        let mut report = EnrichmentReport {
            requested: sites.len(),
            ..EnrichmentReport::default()
        };
        let mut estimates = Estimates::default();

        // Sites sharing a (name, country) query ride on the first one's answer.
        let mut pending = Vec::new();
        let mut leaders: HashMap<CacheKey, SiteId> = HashMap::new();
        let mut followers: HashMap<SiteId, Vec<SiteId>> = HashMap::new();
        for site in sites {
            let key = query_key(&site.name, &site.country);
            if let Some(cached) = self.cache.query(&key) {
                report.cache_hits += 1;
                estimates.insert(site.id.clone(), cached);
                continue;
            }
            match leaders.entry(key) {
                Entry::Occupied(leader) => followers
                    .entry(leader.get().clone())
                    .or_default()
                    .push(site.id.clone()),
                Entry::Vacant(slot) => {
                    slot.insert(site.id.clone());
                    pending.push(EstimateRequest {
                        site_id: site.id.clone(),
                        name: site.name.clone(),
                        country: site.country.clone(),
                    });
                }
            }
        }

        let batch_size = self.options.batch_size.max(1);
        let results: Vec<BatchResult> = stream::iter(pending.chunks(batch_size).enumerate())
            .map(|(number, batch)| self.run_batch(number, batch))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            report.batches += 1;
            report.failed_batches += usize::from(result.failed);
            report.malformed_entries += result.malformed;
            report.cache_hits += result.cache_hits;
            for (site_id, estimate) in result.accepted {
                for follower in followers.remove(&site_id).unwrap_or_default() {
                    estimates.insert(follower, estimate.clone());
                }
                estimates.insert(site_id, estimate);
            }
        }

        report.estimated = estimates.len();
        info!(
            requested = report.requested,
            estimated = report.estimated,
            batches = report.batches,
            failed_batches = report.failed_batches,
            malformed_entries = report.malformed_entries,
            cache_hits = report.cache_hits,
            "enrichment finished"
        );
        (estimates, report)
    }

    async fn run_batch(&self, number: usize, batch: &[EstimateRequest]) -> BatchResult {
        debug!(batch = number, sites = batch.len(), "estimation batch submitted");
        let entries = match self.estimator.estimate(batch).await {
            Ok(entries) => entries,
            Err(source) => {
                let error = EnrichmentError::BatchFailure {
                    batch: number,
                    source,
                };
                warn!(%error, sites = batch.len(), "sites fall through to later tiers");
                return BatchResult {
                    failed: true,
                    accepted: Vec::new(),
                    malformed: 0,
                    cache_hits: 0,
                };
            }
        };

        let (valid, errors) = validate_entries(batch, entries);
        for error in &errors {
            debug!(batch = number, %error, "estimate discarded");
        }
        let (accepted, cache_hits) = self.settle(batch, valid);
        BatchResult {
            failed: false,
            accepted,
            malformed: errors.len(),
            cache_hits,
        }
    }

    /// Reconcile accepted entries with the cache and the city table under one lock.
    fn settle(
        &self,
        batch: &[EstimateRequest],
        valid: Vec<(usize, Estimate)>,
    ) -> (Vec<(SiteId, Estimate)>, usize) {
        let mut state = self.cache.lock();
        let mut cache_hits = 0;
        let mut accepted = Vec::with_capacity(valid.len());

        for (position, mut estimate) in valid {
            let Some(request) = batch.get(position) else {
                continue;
            };
            if let Some(city) = estimate.city.as_deref() {
                let key = (normalize(city), request.country.clone());
                let known = self.index.lookup_by_city(city, request.country.as_str());
                if let Some(cached) = state.cities.get(&key) {
                    estimate.coordinate = Some(*cached);
                    cache_hits += 1;
                } else if let Some(coordinate) = known.or(estimate.coordinate) {
                    estimate.coordinate = Some(coordinate);
                    state.cities.insert(key, coordinate);
                }
            }
            state
                .queries
                .insert(query_key(&request.name, &request.country), estimate.clone());
            accepted.push((request.site_id.clone(), estimate));
        }

        (accepted, cache_hits)
    }
}

/// Check every entry against the batch it answers.
///
/// Returns the accepted estimates by position in `batch`, and one error per rejected or missing
/// entry.
pub fn validate_entries(
    batch: &[EstimateRequest],
    entries: Vec<RawEstimate>,
) -> (Vec<(usize, Estimate)>, Vec<EnrichmentError>) {
    let positions: HashMap<&str, usize> = batch
        .iter()
        .enumerate()
        .map(|(position, request)| (request.site_id.0.as_str(), position))
        .collect();
    let mut answered = HashSet::new();
    let mut accepted = Vec::new();
    let mut errors = Vec::new();

    for entry in entries {
        let Some(site) = entry.site_id.as_deref().map(str::trim) else {
            errors.push(malformed("<missing>", "missing site id"));
            continue;
        };
        let Some(&position) = positions.get(site) else {
            errors.push(malformed(site, "site was not part of the batch"));
            continue;
        };
        if !answered.insert(position) {
            errors.push(malformed(site, "duplicate entry"));
            continue;
        }
        let coordinate = match (entry.latitude, entry.longitude) {
            (None, None) => None,
            (Some(latitude), Some(longitude)) => {
                let Some(coordinate) = Coordinate::new(latitude, longitude) else {
                    errors.push(malformed(site, "coordinate out of range"));
                    continue;
                };
                Some(coordinate)
            }
            _ => {
                errors.push(malformed(site, "partial coordinate"));
                continue;
            }
        };
        let city = entry
            .city
            .as_deref()
            .map(str::trim)
            .filter(|city| !city.is_empty())
            .map(str::to_owned);

        accepted.push((position, Estimate { city, coordinate }));
    }

    for (position, request) in batch.iter().enumerate() {
        if !answered.contains(&position) {
            errors.push(malformed(&request.site_id.0, "missing from response"));
        }
    }

    (accepted, errors)
}

fn malformed(site: &str, reason: &'static str) -> EnrichmentError {
    EnrichmentError::EntryMalformed {
        site: site.to_owned(),
        reason,
    }
}
