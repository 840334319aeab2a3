pub mod database;

pub use database::WalletDb;
