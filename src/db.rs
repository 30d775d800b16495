use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::visitor::VisitorRow;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Create the visitor table when absent. Run once before serving requests;
/// existing tables are never altered.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS visitor_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            ip TEXT,
            city TEXT,
            region TEXT,
            country TEXT,
            userAgent TEXT,
            platform TEXT,
            screenWidth INTEGER,
            screenHeight INTEGER,
            language TEXT,
            lat REAL,
            lon REAL,
            battery_level INTEGER,
            charging BOOLEAN,
            deviceName TEXT,
            browser_city TEXT,
            browser_region TEXT,
            browser_country TEXT
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_visitor(pool: &SqlitePool, row: &VisitorRow) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO visitor_logs (
            timestamp, ip, city, region, country, userAgent, platform,
            screenWidth, screenHeight, language, lat, lon,
            battery_level, charging, deviceName,
            browser_city, browser_region, browser_country
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.timestamp)
    .bind(&row.ip)
    .bind(&row.city)
    .bind(&row.region)
    .bind(&row.country)
    .bind(&row.user_agent)
    .bind(&row.platform)
    .bind(row.screen_width)
    .bind(row.screen_height)
    .bind(&row.language)
    .bind(row.lat)
    .bind(row.lon)
    .bind(row.battery_level)
    .bind(row.charging)
    .bind(&row.device_name)
    .bind(&row.browser_city)
    .bind(&row.browser_region)
    .bind(&row.browser_country)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// A row as read back for the listing page.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StoredVisitor {
    pub id: i64,
    pub timestamp: Option<String>,
    pub ip: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    #[sqlx(rename = "userAgent")]
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    #[sqlx(rename = "screenWidth")]
    pub screen_width: Option<i64>,
    #[sqlx(rename = "screenHeight")]
    pub screen_height: Option<i64>,
    pub language: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub battery_level: Option<f64>,
    pub charging: Option<bool>,
    #[sqlx(rename = "deviceName")]
    pub device_name: Option<String>,
    pub browser_city: Option<String>,
    pub browser_region: Option<String>,
    pub browser_country: Option<String>,
}

/// Every stored visitor, newest first. Row id is the ordering key since the
/// 12-hour textual timestamp does not sort chronologically.
pub async fn list_visitors(pool: &SqlitePool) -> Result<Vec<StoredVisitor>, sqlx::Error> {
    sqlx::query_as::<_, StoredVisitor>(
        "SELECT id, timestamp, ip, city, region, country, userAgent, platform, \
         screenWidth, screenHeight, language, \
         CAST(lat AS REAL) AS lat, CAST(lon AS REAL) AS lon, \
         CAST(battery_level AS REAL) AS battery_level, charging, deviceName, \
         browser_city, browser_region, browser_country \
         FROM visitor_logs ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await
}
