pub mod ble;
pub mod config;
pub mod controller;
pub mod csv_loader;
pub mod feature_extractor;
pub mod finger_bend;
pub mod gateway;
pub mod gesture_classifier;
pub mod input;
pub mod protocol;
pub mod types;
