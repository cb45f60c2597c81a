use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use concilia_core::{DecisionKind, HumanDecision, MatchCandidate};
use concilia_engine::{Cadence, MappingRule, Pattern, PatternCatalog, PatternKind, RuleMode, TokenRule};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            cadence TEXT,
            rule_tokens TEXT NOT NULL,
            confidence REAL NOT NULL,
            occurrences INTEGER NOT NULL,
            last_seen TEXT NOT NULL,
            examples TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mapping_rules (
            id TEXT PRIMARY KEY,
            transaction_tokens TEXT NOT NULL,
            entry_tokens TEXT,
            confidence REAL NOT NULL,
            successes INTEGER NOT NULL DEFAULT 0,
            failures INTEGER NOT NULL DEFAULT 0,
            last_used TEXT,
            mode TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            transaction_id TEXT NOT NULL,
            entry_id TEXT,
            value_divergence REAL NOT NULL,
            day_gap INTEGER NOT NULL,
            text_similarity REAL NOT NULL,
            actor TEXT NOT NULL,
            decided_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL,
            entry_id TEXT NOT NULL,
            score REAL NOT NULL,
            automatic INTEGER NOT NULL,
            origin TEXT NOT NULL,
            matched_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Patterns ─────────────────────────────────────────────────────────────────

pub async fn save_pattern(pool: &DbPool, pattern: &Pattern) -> Result<(), sqlx::Error> {
    let kind = match pattern.kind {
        PatternKind::Recurring => "recurring",
        PatternKind::Seasonal => "seasonal",
        PatternKind::Periodic => "periodic",
        PatternKind::Singular => "singular",
    };
    let cadence = pattern
        .cadence
        .map(|c| serde_json::to_string(&c).unwrap_or_default());
    let tokens = serde_json::to_string(&pattern.rule.tokens).unwrap_or_default();
    let examples = serde_json::to_string(&pattern.examples).unwrap_or_default();

    sqlx::query(
        "INSERT OR REPLACE INTO patterns (id, kind, cadence, rule_tokens, confidence, occurrences, last_seen, examples) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&pattern.id)
    .bind(kind)
    .bind(cadence)
    .bind(tokens)
    .bind(pattern.confidence)
    .bind(i64::from(pattern.occurrences))
    .bind(pattern.last_seen.to_string())
    .bind(examples)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_patterns(pool: &DbPool) -> Result<Vec<Pattern>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, String, f64, i64, String, String)>(
        "SELECT id, kind, cadence, rule_tokens, confidence, occurrences, last_seen, examples FROM patterns ORDER BY id"
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let kind = match r.1.as_str() {
                "recurring" => PatternKind::Recurring,
                "seasonal" => PatternKind::Seasonal,
                "periodic" => PatternKind::Periodic,
                _ => PatternKind::Singular,
            };
            let cadence: Option<Cadence> =
                r.2.as_deref().and_then(|s| serde_json::from_str(s).ok());
            let tokens: Vec<String> = serde_json::from_str(&r.3).unwrap_or_default();
            let examples: Vec<String> = serde_json::from_str(&r.7).unwrap_or_default();
            Pattern {
                id: r.0,
                kind,
                cadence,
                rule: TokenRule::new(tokens),
                confidence: r.4,
                occurrences: r.5 as u32,
                last_seen: NaiveDate::parse_from_str(&r.6, "%Y-%m-%d").unwrap_or_default(),
                examples,
            }
        })
        .collect())
}

// ── Mapping rules ────────────────────────────────────────────────────────────

pub async fn save_mapping_rule(pool: &DbPool, rule: &MappingRule) -> Result<(), sqlx::Error> {
    let mode = match rule.mode {
        RuleMode::Manual => "manual",
        RuleMode::Automatic => "automatic",
        RuleMode::Suggested => "suggested",
    };
    let transaction_tokens = serde_json::to_string(&rule.transaction_rule.tokens).unwrap_or_default();
    let entry_tokens = rule
        .entry_rule
        .as_ref()
        .map(|r| serde_json::to_string(&r.tokens).unwrap_or_default());

    sqlx::query(
        "INSERT OR REPLACE INTO mapping_rules (id, transaction_tokens, entry_tokens, confidence, successes, failures, last_used, mode) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&rule.id)
    .bind(transaction_tokens)
    .bind(entry_tokens)
    .bind(rule.confidence)
    .bind(i64::from(rule.successes))
    .bind(i64::from(rule.failures))
    .bind(rule.last_used.map(|t| t.to_rfc3339()))
    .bind(mode)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_mapping_rules(pool: &DbPool) -> Result<Vec<MappingRule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, f64, i64, i64, Option<String>, String)>(
        "SELECT id, transaction_tokens, entry_tokens, confidence, successes, failures, last_used, mode FROM mapping_rules ORDER BY id"
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let transaction_tokens: Vec<String> = serde_json::from_str(&r.1).unwrap_or_default();
            let entry_tokens: Option<Vec<String>> =
                r.2.as_deref().and_then(|s| serde_json::from_str(s).ok());
            let mode = match r.7.as_str() {
                "manual" => RuleMode::Manual,
                "automatic" => RuleMode::Automatic,
                _ => RuleMode::Suggested,
            };
            MappingRule {
                id: r.0,
                transaction_rule: TokenRule::new(transaction_tokens),
                entry_rule: entry_tokens.map(TokenRule::new),
                confidence: r.3,
                successes: r.4 as u32,
                failures: r.5 as u32,
                last_used: r.6.as_deref().and_then(parse_timestamp),
                mode,
            }
        })
        .collect())
}

/// Persist the whole in-memory catalog.
pub async fn save_catalog(pool: &DbPool, catalog: &PatternCatalog) -> Result<(), sqlx::Error> {
    for pattern in catalog.patterns.values() {
        save_pattern(pool, pattern).await?;
    }
    for rule in &catalog.rules {
        save_mapping_rule(pool, rule).await?;
    }
    Ok(())
}

pub async fn load_catalog(pool: &DbPool) -> Result<PatternCatalog, sqlx::Error> {
    let mut catalog = PatternCatalog::default();
    for pattern in get_patterns(pool).await? {
        catalog.patterns.insert(pattern.id.clone(), pattern);
    }
    catalog.rules = get_mapping_rules(pool).await?;
    Ok(catalog)
}

// ── Decisions ────────────────────────────────────────────────────────────────

pub async fn insert_decision(pool: &DbPool, decision: &HumanDecision) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO decisions (kind, transaction_id, entry_id, value_divergence, day_gap, text_similarity, actor, decided_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(decision.kind.to_string())
    .bind(&decision.transaction_id)
    .bind(&decision.entry_id)
    .bind(decision.value_divergence)
    .bind(i64::from(decision.day_gap))
    .bind(decision.text_similarity)
    .bind(&decision.actor)
    .bind(decision.decided_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_decisions(pool: &DbPool) -> Result<Vec<HumanDecision>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, f64, i64, f64, String, String)>(
        "SELECT kind, transaction_id, entry_id, value_divergence, day_gap, text_similarity, actor, decided_at FROM decisions ORDER BY id"
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| HumanDecision {
            kind: r.0.parse().unwrap_or(DecisionKind::Accept),
            transaction_id: r.1,
            entry_id: r.2,
            value_divergence: r.3,
            day_gap: r.4 as u32,
            text_similarity: r.5,
            actor: r.6,
            decided_at: parse_timestamp(&r.7).unwrap_or_else(Utc::now),
        })
        .collect())
}

// ── Matches ──────────────────────────────────────────────────────────────────

/// Flat persisted form of a committed match; the full transaction and
/// entry stay with their owning collaborators.
#[derive(Debug, Clone)]
pub struct StoredMatch {
    pub id: i64,
    pub transaction_id: String,
    pub entry_id: String,
    pub score: f64,
    pub automatic: bool,
    pub origin: String,
    pub matched_at: DateTime<Utc>,
}

pub async fn insert_match(pool: &DbPool, candidate: &MatchCandidate) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO matches (transaction_id, entry_id, score, automatic, origin, matched_at) VALUES (?, ?, ?, ?, ?, ?)"
    )
    .bind(&candidate.transaction.id)
    .bind(&candidate.entry.id)
    .bind(candidate.score)
    .bind(i64::from(candidate.automatic))
    .bind(candidate.origin.to_string())
    .bind(candidate.matched_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_matches(pool: &DbPool) -> Result<Vec<StoredMatch>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, f64, i64, String, String)>(
        "SELECT id, transaction_id, entry_id, score, automatic, origin, matched_at FROM matches ORDER BY id"
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| StoredMatch {
            id: r.0,
            transaction_id: r.1,
            entry_id: r.2,
            score: r.3,
            automatic: r.4 != 0,
            origin: r.5,
            matched_at: parse_timestamp(&r.6).unwrap_or_else(Utc::now),
        })
        .collect())
}

/// Remove a committed match after a human undo. The caller is responsible
/// for recording the corresponding decision.
pub async fn delete_match(pool: &DbPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM matches WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
