mod cache;
mod config;
mod vote_set;
