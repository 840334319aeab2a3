use super::SchemaHistory;
use crate::core::SchemaVersion;

/// Bumped whenever the record-set layout or a data step changes.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = 10;

/// Record-sets of the wallet store at [`CURRENT_SCHEMA_VERSION`].
pub const WALLET_TABLES: [&str; 16] = [
    "users",
    "transactions",
    "invoices",
    "contacts",
    "contactAddresses",
    "exchangeContacts",
    "activityHistory",
    "wallets",
    "paperWallets",
    "history",
    "userSettings",
    "pwImportHistory",
    "errors",
    "web3Connections",
    "mnemonicPasswords",
    "quickExchangeHistory",
];

/// Table declarations of the wallet store, version by version.
pub fn wallet_schema_history() -> SchemaHistory {
    SchemaHistory::new()
        .version(
            1,
            [
                ("users", Some("++id, &email")),
                ("transactions", Some("++id, hash, walletId")),
                ("invoices", Some("++id, walletId, status")),
                ("contacts", Some("++id, name")),
                ("wallets", Some("++id, &address, chain, userId")),
                ("history", Some("++id, walletId, timestamp")),
                ("userSettings", Some("++id, &userId")),
                ("errors", Some("++id, timestamp")),
            ],
        )
        .version(2, [("paperWallets", Some("++id, &address"))])
        .version(4, [("contactAddresses", Some("++id, contactId, address, chain"))])
        .version(
            5,
            [
                ("exchangeContacts", Some("++id, name, exchange")),
                ("activityHistory", Some("++id, type, timestamp")),
            ],
        )
        .version(6, [("contacts", Some("++id, name, type"))])
        .version(7, [("pwImportHistory", Some("++id, paperWalletId"))])
        .version(
            8,
            [
                ("transactions", Some("++id, hash, walletId, chain")),
                ("web3Connections", Some("++id, &origin, walletId")),
            ],
        )
        .version(9, [("mnemonicPasswords", Some("++id, &walletId"))])
        .version(10, [("quickExchangeHistory", Some("++id, pair, timestamp"))])
}
