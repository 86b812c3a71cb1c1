// Copyright (C) 2015-2021 Vaultos Systems Inc.
// This file is part of the vaultos library.

// The vaultos library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The vaultos library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the vaultos library. If not, see <https://www.gnu.org/licenses/>.

use ed25519_dalek::{Signer, SigningKey};
use vaultos_objects::{
    CoveredFields, Hash, Transaction, TransactionSignature, UnlockConditions, UnlockHash,
};

/// A deterministic ed25519 key for fixtures. The same seed always yields
/// the same unlock hash, which keeps genesis ids and test chains stable
/// across runs and across nodes.
#[derive(Clone)]
pub struct TestKey {
    signing: SigningKey,
}

impl TestKey {
    pub fn from_seed(seed: u8) -> TestKey {
        TestKey {
            signing: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn unlock_conditions(&self) -> UnlockConditions {
        UnlockConditions::standard(self.public_key_bytes())
    }

    pub fn unlock_hash(&self) -> UnlockHash {
        self.unlock_conditions().unlock_hash()
    }

    /// Append one whole-transaction signature per parent id, then fill the
    /// signature bytes. Whole coverage does not include other signature
    /// bodies, so signing after all slots exist is sound.
    pub fn sign_transaction(&self, txn: &mut Transaction, parent_ids: &[Hash]) {
        let base = txn.transaction_signatures.len();
        for parent_id in parent_ids {
            txn.transaction_signatures.push(TransactionSignature {
                parent_id: *parent_id,
                public_key_index: 0,
                timelock: 0,
                covered_fields: CoveredFields::whole_transaction(),
                signature: vec![],
            });
        }
        for i in 0..parent_ids.len() {
            let sig_hash = txn
                .sig_hash(base + i)
                .expect("fixture transactions are well formed");
            let signature = self.signing.sign(sig_hash.as_bytes());
            txn.transaction_signatures[base + i].signature = signature.to_bytes().to_vec();
        }
    }
}
