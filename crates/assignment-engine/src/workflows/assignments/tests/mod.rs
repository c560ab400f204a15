mod common;
mod concurrency;
mod reports;
