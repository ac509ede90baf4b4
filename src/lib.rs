//! Floor Price Backend Library
//!
//! Adaptive quantile floor price estimation for NFT collections, shared by
//! the `floorprice` binary and integration tests.

pub mod floor_price;
