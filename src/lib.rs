//! otalink — MQTT-driven OTA update agent for ESP32-class devices.
//!
//! The agent listens for firmware announcements on a pub/sub topic,
//! streams the advertised image over HTTP(S) into the inactive partition
//! while hashing it on the fly, verifies SHA-256, and arms the new
//! partition for the next boot.  Everything runs on a single cooperative
//! tick the host calls every 10-100 ms; nothing here spawns threads.
//!
//! The library exposes the pure-logic modules for integration testing and
//! external inspection.  ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within the adapter modules.

#![deny(unused_must_use)]

pub mod agent;
pub mod cert;
pub mod config;
pub mod control;
pub mod download;
pub mod error;
pub mod installer;
pub mod version;

pub mod adapters;
pub mod drivers;
