//! Transaction envelope signing with a derived key.
//!
//! ```text
//! network_id = sha256(passphrase)
//! hash       = sha256(xdr(TransactionSignaturePayload { network_id, tx }))
//! envelope.signatures += { hint: pubkey[28..32], signature: ed25519(hash) }
//! ```

use super::Identity;
use crate::errors::{WalletError, WalletResult};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    DecoratedSignature, Hash, Limits, ReadXdr, Signature, SignatureHint, TransactionEnvelope,
    TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction, VecM, WriteXdr,
};

fn xdr_err(e: stellar_xdr::curr::Error) -> WalletError {
    WalletError::InvalidRequest(format!("transaction envelope: {e}"))
}

/// Hash the network signs for `envelope` on the network named by `passphrase`.
pub fn signature_hash(envelope: &TransactionEnvelope, passphrase: &str) -> WalletResult<[u8; 32]> {
    let tagged_transaction = match envelope {
        TransactionEnvelope::Tx(env) => {
            TransactionSignaturePayloadTaggedTransaction::Tx(env.tx.clone())
        }
        TransactionEnvelope::TxFeeBump(env) => {
            TransactionSignaturePayloadTaggedTransaction::TxFeeBump(env.tx.clone())
        }
        TransactionEnvelope::TxV0(_) => {
            return Err(WalletError::InvalidRequest(
                "v0 transaction envelopes are not supported".into(),
            ));
        }
    };
    let payload = TransactionSignaturePayload {
        network_id: Hash(Sha256::digest(passphrase.as_bytes()).into()),
        tagged_transaction,
    };
    let bytes = payload.to_xdr(Limits::none()).map_err(xdr_err)?;
    Ok(Sha256::digest(bytes).into())
}

fn append(
    signatures: &VecM<DecoratedSignature, 20>,
    signature: DecoratedSignature,
) -> WalletResult<VecM<DecoratedSignature, 20>> {
    let mut all = signatures.to_vec();
    all.push(signature);
    all.try_into().map_err(xdr_err)
}

impl Identity {
    /// Add this key's signature to a base64 XDR envelope and return the
    /// re-encoded envelope.
    pub fn sign_envelope(&self, envelope_xdr: &str, passphrase: &str) -> WalletResult<String> {
        let mut envelope = TransactionEnvelope::from_xdr_base64(envelope_xdr.trim(), Limits::none())
            .map_err(xdr_err)?;
        let hash = signature_hash(&envelope, passphrase)?;
        let public = self.signing_key.verifying_key().to_bytes();
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&public[28..]);
        let decorated = DecoratedSignature {
            hint: SignatureHint(hint),
            signature: Signature(self.sign(&hash).to_vec().try_into().map_err(xdr_err)?),
        };
        match &mut envelope {
            TransactionEnvelope::Tx(env) => env.signatures = append(&env.signatures, decorated)?,
            TransactionEnvelope::TxFeeBump(env) => {
                env.signatures = append(&env.signatures, decorated)?
            }
            TransactionEnvelope::TxV0(env) => env.signatures = append(&env.signatures, decorated)?,
        }
        envelope.to_xdr_base64(Limits::none()).map_err(xdr_err)
    }
}

/// Unsigned one-payment envelope from `source`, base64 XDR.
#[cfg(test)]
pub(crate) fn payment_envelope(source: [u8; 32]) -> String {
    use stellar_xdr::curr::{
        Asset, Memo, MuxedAccount, Operation, OperationBody, PaymentOp, Preconditions,
        SequenceNumber, Transaction, TransactionExt, TransactionV1Envelope, Uint256,
    };

    let payment = Operation {
        source_account: None,
        body: OperationBody::Payment(PaymentOp {
            destination: MuxedAccount::Ed25519(Uint256([0u8; 32])),
            asset: Asset::Native,
            amount: 10_000_000,
        }),
    };
    let tx = Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(source)),
        fee: 100,
        seq_num: SequenceNumber(1),
        cond: Preconditions::None,
        memo: Memo::None,
        operations: vec![payment].try_into().unwrap(),
        ext: TransactionExt::V0,
    };
    TransactionEnvelope::Tx(TransactionV1Envelope { tx, signatures: VecM::default() })
        .to_xdr_base64(Limits::none())
        .unwrap()
}
