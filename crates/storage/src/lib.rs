pub mod db;

pub use db::{
    create_db, delete_match, get_decisions, get_mapping_rules, get_matches, get_patterns,
    insert_decision, insert_match, load_catalog, save_catalog, save_mapping_rule, save_pattern,
    DbPool, StoredMatch,
};
