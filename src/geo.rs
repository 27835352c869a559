//! Nearby zip code lookup backed by a SQLite gazetteer
//!
//! The gazetteer is a single `zipcodes` table mapping each zip code to its
//! centroid coordinates. Lookups fail closed: an unavailable dataset, an
//! unknown zip, or missing coordinates all yield an empty result set rather
//! than an error, so callers never have to handle a geo failure mid-run.

use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Mean Earth radius in miles, for great-circle distances
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Approximate miles per degree of latitude, for the bounding-box prefilter
const MILES_PER_DEGREE: f64 = 69.0;

/// Extra rows requested beyond `max_results` so the origin zip can be
/// discarded after the distance search without starving the result set.
const OVER_FETCH: i64 = 10;

/// Nearest-neighbor zip code search.
///
/// `nearby` returns zip codes within `radius_miles` of `zip`, nearest first,
/// never including `zip` itself and never more than `max_results` entries.
#[async_trait]
pub trait ZipNeighbors: Send + Sync {
    async fn nearby(&self, zip: &str, radius_miles: f64, max_results: usize) -> Vec<String>;
}

/// Zip code gazetteer stored in SQLite.
pub struct ZipDatabase {
    pool: SqlitePool,
}

impl ZipDatabase {
    /// Open an existing gazetteer file read-only.
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite://{}?mode=ro", path))
            .await?;
        Ok(Self { pool })
    }

    /// Create an empty in-memory gazetteer.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS zipcodes (
                zip TEXT PRIMARY KEY,
                lat REAL NOT NULL,
                lng REAL NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Insert or replace a gazetteer entry.
    pub async fn insert(&self, zip: &str, lat: f64, lng: f64) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO zipcodes (zip, lat, lng) VALUES (?, ?, ?)")
            .bind(zip)
            .bind(lat)
            .bind(lng)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Centroid coordinates for a zip code, if known.
    async fn coordinates(&self, zip: &str) -> Result<Option<(f64, f64)>> {
        let row: Option<(f64, f64)> = sqlx::query_as("SELECT lat, lng FROM zipcodes WHERE zip = ?")
            .bind(zip)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Candidate rows inside the bounding box around (`lat`, `lng`), ordered
    /// by squared degree offset as a cheap distance proxy. Exact geodesic
    /// ordering happens in `nearby` after the haversine pass.
    async fn candidates_near(
        &self,
        lat: f64,
        lng: f64,
        radius_miles: f64,
        limit: i64,
    ) -> Result<Vec<(String, f64, f64)>> {
        let lat_delta = radius_miles / MILES_PER_DEGREE;
        let lng_delta = radius_miles / (MILES_PER_DEGREE * lat.to_radians().cos().abs().max(0.01));

        let rows: Vec<(String, f64, f64)> = sqlx::query_as(
            "SELECT zip, lat, lng FROM zipcodes
             WHERE lat BETWEEN ? AND ? AND lng BETWEEN ? AND ?
             ORDER BY (lat - ?) * (lat - ?) + (lng - ?) * (lng - ?)
             LIMIT ?",
        )
        .bind(lat - lat_delta)
        .bind(lat + lat_delta)
        .bind(lng - lng_delta)
        .bind(lng + lng_delta)
        .bind(lat)
        .bind(lat)
        .bind(lng)
        .bind(lng)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn nearby_inner(
        &self,
        zip: &str,
        radius_miles: f64,
        max_results: usize,
    ) -> Result<Vec<String>> {
        let Some((lat, lng)) = self.coordinates(zip).await? else {
            warn!(zip = %zip, "no coordinates for target zip code");
            return Ok(Vec::new());
        };

        // Over-fetch so dropping the origin zip cannot starve the result set.
        let limit = max_results as i64 + OVER_FETCH;
        let candidates = self.candidates_near(lat, lng, radius_miles, limit).await?;

        let mut scored: Vec<(f64, String)> = candidates
            .into_iter()
            .filter(|(candidate, _, _)| candidate != zip)
            .map(|(candidate, c_lat, c_lng)| {
                (haversine_miles(lat, lng, c_lat, c_lng), candidate)
            })
            .filter(|(distance, _)| *distance <= radius_miles)
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(max_results);

        let zips: Vec<String> = scored.into_iter().map(|(_, candidate)| candidate).collect();
        debug!(zip = %zip, radius_miles, found = zips.len(), "nearby zip search complete");
        Ok(zips)
    }
}

#[async_trait]
impl ZipNeighbors for ZipDatabase {
    async fn nearby(&self, zip: &str, radius_miles: f64, max_results: usize) -> Vec<String> {
        match self.nearby_inner(zip, radius_miles, max_results).await {
            Ok(zips) => zips,
            Err(e) => {
                warn!(zip = %zip, error = %e, "nearby zip search failed, returning no candidates");
                Vec::new()
            }
        }
    }
}

/// Great-circle distance in miles between two coordinate pairs.
pub fn haversine_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manhattan_db() -> ZipDatabase {
        let db = ZipDatabase::in_memory().await.unwrap();
        // Lower Manhattan zips, all within a few miles of each other
        db.insert("10001", 40.7506, -73.9972).await.unwrap();
        db.insert("10002", 40.7157, -73.9862).await.unwrap();
        db.insert("10003", 40.7317, -73.9890).await.unwrap();
        db.insert("10011", 40.7417, -74.0004).await.unwrap();
        // Los Angeles, far outside any reasonable radius
        db.insert("90210", 34.0901, -118.4065).await.unwrap();
        db
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York City to Los Angeles is roughly 2,445 miles
        let d = haversine_miles(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((d - 2445.0).abs() < 20.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero_distance() {
        let d = haversine_miles(40.0, -74.0, 40.0, -74.0);
        assert!(d.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_nearby_excludes_origin_zip() {
        let db = manhattan_db().await;
        let zips = db.nearby("10001", 10.0, 5).await;
        assert!(!zips.is_empty());
        assert!(!zips.contains(&"10001".to_string()));
    }

    #[tokio::test]
    async fn test_nearby_orders_nearest_first() {
        let db = manhattan_db().await;
        let zips = db.nearby("10001", 10.0, 5).await;
        // 10011 is closest to 10001, 10002 is farthest of the three
        assert_eq!(zips, vec!["10011", "10003", "10002"]);
    }

    #[tokio::test]
    async fn test_nearby_truncates_to_max_results() {
        let db = manhattan_db().await;
        let zips = db.nearby("10001", 10.0, 2).await;
        assert_eq!(zips.len(), 2);
        assert_eq!(zips, vec!["10011", "10003"]);
    }

    #[tokio::test]
    async fn test_nearby_respects_radius_bound() {
        let db = manhattan_db().await;
        let zips = db.nearby("10001", 3000.0, 10).await;
        assert!(zips.contains(&"90210".to_string()));

        let zips = db.nearby("10001", 10.0, 10).await;
        assert!(!zips.contains(&"90210".to_string()));
    }

    #[tokio::test]
    async fn test_nearby_unknown_zip_is_empty() {
        let db = manhattan_db().await;
        let zips = db.nearby("99999", 50.0, 5).await;
        assert!(zips.is_empty());
    }

    #[tokio::test]
    async fn test_nearby_tight_radius_is_empty() {
        let db = manhattan_db().await;
        let zips = db.nearby("90210", 1.0, 5).await;
        assert!(zips.is_empty());
    }
}
