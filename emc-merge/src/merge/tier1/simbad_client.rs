// Tier 1: SIMBAD / VizieR TAP Client
//
// Concept: Resolve star names and positions against SIMBAD, and TIC numbers
// against the TESS Input Catalog on VizieR, through their synchronous TAP
// (ADQL) endpoints with JSON output.
//
// Timeouts and rate limiting are configured from [resolver]; retries are
// applied by the caller (see retry.rs) so this client makes exactly one
// request per call.
//
// Batched name lookups send one POST with an `ident.id IN (...)` list of up
// to `batch_size` names. Each result row carries the matched identifier, so
// answers map back to their queries; names without a row are not found.

use async_trait::async_trait;
use emc_common::config::ResolverConfig;
use emc_common::Coordinates;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;
use std::time::Duration;

use super::lookup::{BatchResult, LookupError, LookupHit, LookupResult, StellarLookup};
use crate::error::{MergeError, MergeResult};

/// TESS Input Catalog table on VizieR
const TIC_TABLE: &str = "IV/39/tic82";

/// TAP JSON response: column metadata plus row arrays
#[derive(Debug, Deserialize)]
struct TapResponse {
    metadata: Vec<TapColumn>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct TapColumn {
    name: String,
}

impl TapResponse {
    fn column(&self, name: &str) -> Option<usize> {
        self.metadata
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// SIMBAD client (Tier 1 lookup concept)
///
/// **Legible Software Principle:**
/// - Independent module: Only depends on HTTP client
/// - Explicit synchronization: Implements `StellarLookup`
/// - Transparent behavior: One ADQL query per call (single or batched), visible timeouts
/// - Integrity: Rate limiting enforced across all concurrent callers
pub struct SimbadClient {
    /// HTTP client with configured timeouts
    client: Client,
    /// SIMBAD TAP base URL
    simbad_url: String,
    /// VizieR TAP base URL
    vizier_url: String,
    /// Names per batched query
    batch_size: usize,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl SimbadClient {
    /// Create a client from the resolver configuration
    pub fn new(config: &ResolverConfig) -> MergeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(format!("exo-mercat/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                MergeError::Common(emc_common::Error::Config(format!(
                    "failed to build HTTP client: {}",
                    e
                )))
            })?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            simbad_url: config.simbad_url.trim_end_matches('/').to_string(),
            vizier_url: config.vizier_url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
            rate_limiter,
        })
    }

    /// Run one ADQL query against a TAP service
    async fn query(&self, base_url: &str, adql: &str) -> Result<TapResponse, LookupError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(service = base_url, "TAP query: {}", adql);

        let request = self.client.get(format!("{}/sync", base_url)).query(&[
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", "json"),
            ("QUERY", adql),
        ]);
        Self::execute(request).await
    }

    /// Run a long ADQL query as a form POST
    async fn query_form(&self, base_url: &str, adql: &str) -> Result<TapResponse, LookupError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(service = base_url, bytes = adql.len(), "TAP batch query");

        let request = self.client.post(format!("{}/sync", base_url)).form(&[
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", "json"),
            ("QUERY", adql),
        ]);
        Self::execute(request).await
    }

    async fn execute(request: reqwest::RequestBuilder) -> Result<TapResponse, LookupError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout(0)
            } else {
                LookupError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(LookupError::RateLimited(status.as_u16()));
        } else if status.is_server_error() {
            return Err(LookupError::Transport(format!("service returned {}", status)));
        } else if !status.is_success() {
            return Err(LookupError::Malformed(format!("service returned {}", status)));
        }

        response
            .json::<TapResponse>()
            .await
            .map_err(|e| LookupError::Malformed(format!("failed to parse TAP response: {}", e)))
    }

    /// First row of a SIMBAD `main_id, ra, dec, ids` result
    fn parse_simbad_hit(response: &TapResponse) -> LookupResult {
        match response.data.first() {
            Some(row) => Self::hit_from_row(response, row).map(Some),
            None => Ok(None),
        }
    }

    /// Rows of a batched result keyed by the matched identifier
    fn parse_simbad_batch(response: &TapResponse, queries: &[String]) -> BatchResult {
        let id_col = response
            .column("id")
            .ok_or_else(|| LookupError::Malformed("no id column".to_string()))?;

        let mut by_id: BTreeMap<String, LookupHit> = BTreeMap::new();
        for row in &response.data {
            let Some(id) = row.get(id_col).and_then(Value::as_str).map(squash) else {
                continue;
            };
            if by_id.contains_key(&id) {
                continue;
            }
            by_id.insert(id, Self::hit_from_row(response, row)?);
        }

        Ok(queries
            .iter()
            .map(|q| (q.clone(), by_id.get(&squash(q)).cloned()))
            .collect())
    }

    fn hit_from_row(response: &TapResponse, row: &[Value]) -> Result<LookupHit, LookupError> {
        let main_id_col = response
            .column("main_id")
            .ok_or_else(|| LookupError::Malformed("no main_id column".to_string()))?;

        let main_id = row
            .get(main_id_col)
            .and_then(Value::as_str)
            .map(squash)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LookupError::Malformed("empty main_id".to_string()))?;

        let coordinates = coordinates_from_row(response, row, "ra", "dec");

        let ids: BTreeSet<String> = response
            .column("ids")
            .and_then(|idx| row.get(idx))
            .and_then(Value::as_str)
            .map(|ids| ids.split('|').map(squash).filter(|id| !id.is_empty()).collect())
            .unwrap_or_default();

        Ok(LookupHit {
            main_id,
            coordinates,
            ids,
        })
    }
}

/// Collapse runs of whitespace, as SIMBAD pads identifiers
fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn coordinates_from_row(
    response: &TapResponse,
    row: &[Value],
    ra_col: &str,
    dec_col: &str,
) -> Option<Coordinates> {
    let ra = response.column(ra_col).and_then(|i| row.get(i)).and_then(Value::as_f64)?;
    let dec = response.column(dec_col).and_then(|i| row.get(i)).and_then(Value::as_f64)?;
    Some(Coordinates::new(ra, dec))
}

/// Quote a string literal for ADQL
fn adql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[async_trait]
impl StellarLookup for SimbadClient {
    fn name(&self) -> &str {
        "SIMBAD"
    }

    async fn resolve(&self, query: &str) -> LookupResult {
        let adql = format!(
            "SELECT TOP 1 basic.main_id, basic.ra, basic.dec, ids.ids \
             FROM ident JOIN basic ON ident.oidref = basic.oid \
             LEFT JOIN ids ON ids.oidref = basic.oid \
             WHERE ident.id = {}",
            adql_literal(query)
        );
        let response = self.query(&self.simbad_url, &adql).await?;
        Self::parse_simbad_hit(&response)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn resolve_batch(&self, queries: &[String]) -> BatchResult {
        if queries.is_empty() {
            return Ok(BTreeMap::new());
        }
        let list = queries.iter().map(|q| adql_literal(q)).collect::<Vec<_>>().join(", ");
        let adql = format!(
            "SELECT ident.id, basic.main_id, basic.ra, basic.dec, ids.ids \
             FROM ident JOIN basic ON ident.oidref = basic.oid \
             LEFT JOIN ids ON ids.oidref = basic.oid \
             WHERE ident.id IN ({})",
            list
        );
        let response = self.query_form(&self.simbad_url, &adql).await?;
        Self::parse_simbad_batch(&response, queries)
    }

    async fn resolve_by_coordinates(&self, coordinates: Coordinates, radius_deg: f64) -> LookupResult {
        let adql = format!(
            "SELECT TOP 1 basic.main_id, basic.ra, basic.dec, ids.ids \
             FROM basic LEFT JOIN ids ON ids.oidref = basic.oid \
             WHERE CONTAINS(POINT('ICRS', basic.ra, basic.dec), \
             CIRCLE('ICRS', {ra}, {dec}, {radius})) = 1 \
             ORDER BY DISTANCE(POINT('ICRS', basic.ra, basic.dec), POINT('ICRS', {ra}, {dec})) ASC",
            ra = coordinates.ra,
            dec = coordinates.dec,
            radius = radius_deg
        );
        let response = self.query(&self.simbad_url, &adql).await?;
        Self::parse_simbad_hit(&response)
    }

    async fn resolve_survey_id(&self, tic: u64) -> LookupResult {
        let adql = format!(
            "SELECT TOP 1 TIC, RAJ2000, DEJ2000 FROM \"{}\" WHERE TIC = {}",
            TIC_TABLE, tic
        );
        let response = self.query(&self.vizier_url, &adql).await?;
        let Some(row) = response.data.first() else {
            return Ok(None);
        };
        let coordinates = coordinates_from_row(&response, row, "RAJ2000", "DEJ2000");
        let main_id = format!("TIC {}", tic);
        let mut hit = LookupHit::new(&main_id, coordinates);
        hit.ids.insert(main_id);
        Ok(Some(hit))
    }
}
