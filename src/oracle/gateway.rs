use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::analysis::similarity::{SimilarityAnalyzer, SimilarityConfig};
use crate::model::test_case::TestCase;
use crate::oracle::backoff::{BackoffPolicy, RateLimiter, Sleeper, ThreadSleeper};
use crate::oracle::cache::OracleCache;
use crate::oracle::oracle_model::{
    OracleConfig, OracleError, OracleRecommendation, OracleVerdict, SemanticOracle,
};

/// Multiplier applied to oracle similarity for cases on different websites.
pub const WEBSITE_GUARD_FACTOR: f64 = 0.3;

/// Candidate cap scaled by suite size: 1x below 50 cases, 1.5x below 100,
/// 2x below 200, 2.5x beyond.
pub fn smart_limit(base: usize, total_cases: usize) -> usize {
    let factor = if total_cases < 50 {
        1.0
    } else if total_cases < 100 {
        1.5
    } else if total_cases < 200 {
        2.0
    } else {
        2.5
    };
    (base as f64 * factor) as usize
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GatewayStats {
    pub requests: usize,
    pub cache_hits: usize,
    pub failures: usize,
    pub retries: usize,
}

/// Every oracle call goes through here: cache, rate limit, retry, website
/// guard. Errors never escape; a failed pair yields `None`.
pub struct OracleGateway {
    oracle: Box<dyn SemanticOracle>,
    limiter: RateLimiter,
    backoff: BackoffPolicy,
    sleeper: Box<dyn Sleeper>,
    cache: Option<OracleCache>,
    domains: SimilarityAnalyzer,
    stats: GatewayStats,
}

impl OracleGateway {
    pub fn new(oracle: Box<dyn SemanticOracle>) -> Self {
        Self {
            oracle,
            limiter: RateLimiter::new(Duration::from_millis(12_000)),
            backoff: BackoffPolicy::default(),
            sleeper: Box::new(ThreadSleeper),
            cache: None,
            domains: SimilarityAnalyzer::default(),
            stats: GatewayStats::default(),
        }
    }

    /// Gateway with the configured pacing, cache and website-domain tables.
    pub fn from_config(oracle: Box<dyn SemanticOracle>, config: &OracleConfig, similarity: &SimilarityConfig) -> Self {
        let gateway = Self::new(oracle)
            .with_domain_analyzer(SimilarityAnalyzer::new(similarity.clone()))
            .with_rate_limit(Duration::from_millis(config.rate_limit_ms))
            .with_backoff(BackoffPolicy::new(
                config.backoff_max_attempts,
                Duration::from_millis(config.backoff_base_delay_ms),
            ));

        if config.cache_enabled {
            gateway.with_cache(OracleCache::open(
                Path::new(&config.cache_dir),
                config.cache_expiry_days,
            ))
        } else {
            gateway
        }
    }

    pub fn with_rate_limit(mut self, min_interval: Duration) -> Self {
        self.limiter = RateLimiter::new(min_interval);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cache(mut self, cache: OracleCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Domain extraction used by the website guard.
    pub fn with_domain_analyzer(mut self, analyzer: SimilarityAnalyzer) -> Self {
        self.domains = analyzer;
        self
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn assess(&mut self, a: &TestCase, b: &TestCase) -> Option<OracleVerdict> {
        if let Some(cache) = self.cache.as_mut() {
            if let Some(verdict) = cache.get(a, b) {
                self.stats.cache_hits += 1;
                tracing::debug!(first = a.id, second = b.id, "oracle cache hit");
                return Some(verdict);
            }
        }

        let verdict = self.call_with_retry(a, b)?;
        let verdict = self.apply_website_guard(a, b, verdict);

        if let Some(cache) = self.cache.as_mut() {
            cache.put(a, b, &verdict);
        }
        Some(verdict)
    }

    fn call_with_retry(&mut self, a: &TestCase, b: &TestCase) -> Option<OracleVerdict> {
        let mut attempt = 1;
        loop {
            self.limiter.wait(self.sleeper.as_ref());
            self.stats.requests += 1;

            match self.oracle.assess(a, b) {
                Ok(verdict) => return Some(verdict),
                Err(OracleError::RateLimited) if self.backoff.should_retry(attempt) => {
                    let delay = self.backoff.delay_for(attempt);
                    tracing::warn!(
                        first = a.id,
                        second = b.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "oracle rate limited, backing off"
                    );
                    self.stats.retries += 1;
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    self.stats.failures += 1;
                    tracing::warn!(first = a.id, second = b.id, error = %e, "oracle gave no opinion");
                    return None;
                }
            }
        }
    }

    fn apply_website_guard(&self, a: &TestCase, b: &TestCase, mut verdict: OracleVerdict) -> OracleVerdict {
        if self.domains.different_websites(a, b) {
            verdict.semantic_similarity *= WEBSITE_GUARD_FACTOR;
            verdict.recommendation = OracleRecommendation::KeepBoth;
            verdict.different_websites = true;
        }
        verdict
    }
}
