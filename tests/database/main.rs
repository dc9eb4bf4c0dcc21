#[path = "../common/mod.rs"]
mod common;

mod db_tests;
