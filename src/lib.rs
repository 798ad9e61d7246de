// src/lib.rs
pub mod ports {
    pub mod replay_feed;
    pub mod synthetic;
}
pub mod trade {
    pub mod execution {
        pub mod order_sink;
    }
}
pub mod config;
pub mod pairtrade;
pub mod report;
pub mod runner;
