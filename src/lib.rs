pub mod authorization;
pub mod catalog;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod mailer;
pub mod normalization;
pub mod patch;
pub mod rating;
pub mod review;
pub mod routes;
pub mod urls;
pub mod user;
pub mod validation;
