pub mod account;
pub mod auth;
pub mod babysitters;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod lifecycle;
pub mod normalization;
pub mod reservation;
pub mod review;
pub mod routes;
pub mod search;
pub mod times;
pub mod urls;
