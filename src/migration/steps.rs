//! Data steps of the wallet store.

use super::plan::MigrationTable;
use super::transaction::UpgradeTransaction;
use crate::core::{Result, WriteOptions};
use crate::schema::CURRENT_SCHEMA_VERSION;
use serde_json::Value as JsonValue;

/// Step table for the wallet store at [`CURRENT_SCHEMA_VERSION`].
pub fn wallet_migrations() -> Result<MigrationTable> {
    let mut table = MigrationTable::new(CURRENT_SCHEMA_VERSION);
    table.add_fn_step(3, "lowercase user emails", lowercase_user_emails)?;
    table.add_fn_step(6, "default contact type to regular", default_contact_type)?;
    table.add_fn_step(8, "drop cached transactions before chain index", clear_transactions)?;
    table.add_fn_step(9, "drop cached transactions again", clear_transactions)?;
    table.add_fn_step(10, "add web3 MFA setting", add_web3_mfa_setting)?;
    Ok(table)
}

fn lowercase_user_emails(tx: &mut UpgradeTransaction<'_>) -> Result<()> {
    tx.modify("users", WriteOptions::default(), |user| {
        if let Some(JsonValue::String(email)) = user.get_mut("email") {
            *email = email.to_lowercase();
        }
        Ok(())
    })?;
    Ok(())
}

fn default_contact_type(tx: &mut UpgradeTransaction<'_>) -> Result<()> {
    tx.modify("contacts", WriteOptions::default(), |contact| {
        contact.insert("type".to_string(), JsonValue::from("regular"));
        Ok(())
    })?;
    Ok(())
}

fn clear_transactions(tx: &mut UpgradeTransaction<'_>) -> Result<()> {
    let removed = tx.clear("transactions")?;
    tracing::debug!(version = tx.version(), removed, "cleared transactions");
    Ok(())
}

// Settings hold encrypted fields; the record is rewritten in stored form.
fn add_web3_mfa_setting(tx: &mut UpgradeTransaction<'_>) -> Result<()> {
    tx.modify("userSettings", WriteOptions::raw(), |settings| {
        settings.insert("mfaRequireOnWeb3Requests".to_string(), JsonValue::Bool(false));
        Ok(())
    })?;
    Ok(())
}
