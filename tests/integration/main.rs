mod common;
mod health_test;
mod hot_reload_test;
mod proxy_test;
