//! Builds platform-signed envelopes for the two escrow-resolving calls Task
//! Board makes back into Central Bank, mirroring the Python's
//! `EscrowCoordinator` (a thin wrapper so `task_manager.py` never touches
//! signing directly).

use agent_economy_common::central_bank_client::CentralBankClient;
use agent_economy_common::error::ServiceError;
use agent_economy_common::platform_signer::PlatformSigner;
use serde_json::json;

pub struct EscrowCoordinator<'a> {
    pub central_bank: &'a CentralBankClient,
    pub signer: &'a PlatformSigner,
}

impl<'a> EscrowCoordinator<'a> {
    pub async fn release_escrow(
        &self,
        escrow_id: &str,
        recipient_account_id: &str,
    ) -> Result<(), ServiceError> {
        let token = self.signer.sign(&json!({
            "action": "escrow_release",
            "escrow_id": escrow_id,
            "recipient_account_id": recipient_account_id,
        }));
        self.central_bank.escrow_release(&token).await?;
        Ok(())
    }

    pub async fn split_escrow(
        &self,
        escrow_id: &str,
        worker_account_id: &str,
        poster_account_id: &str,
        worker_pct: i64,
    ) -> Result<(), ServiceError> {
        let token = self.signer.sign(&json!({
            "action": "escrow_split",
            "escrow_id": escrow_id,
            "worker_pct": worker_pct,
            "worker_account_id": worker_account_id,
            "poster_account_id": poster_account_id,
        }));
        self.central_bank.escrow_split(&token).await?;
        Ok(())
    }

    pub async fn lock_escrow(&self, escrow_token: &str) -> Result<String, ServiceError> {
        let result = self.central_bank.escrow_lock(escrow_token).await?;
        result
            .get("escrow_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::internal("central bank reported no escrow_id on lock"))
    }
}
