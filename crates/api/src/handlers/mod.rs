pub mod books;
pub mod jobs;
pub mod ws_stats;
