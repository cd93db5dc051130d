pub mod rate_refresh;
