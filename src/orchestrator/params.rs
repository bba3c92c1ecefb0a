//! Versioned callback parameters carried through the flash lender.
//!
//! Each flow ABI-encodes one of these into the flash loan's `data` and decodes
//! it again inside the callback. They live for exactly one call.

use alloy_primitives::Bytes;
use alloy_sol_types::{sol, SolType};

use crate::error::{OrchestratorError, Result};

/// Layout version written by this build.
pub const PARAMS_VERSION: u8 = 1;

sol! {
    #![sol(all_derives)]

    #[sol(all_derives)]
    struct DepositParams {
        uint8 version;
        address receiver;
        uint256 depositAssets;
        uint256 leveragedAssets;
        uint32 slippageBps;
        bytes venuePayload;
        address vault;
    }

    #[sol(all_derives)]
    struct WithdrawParams {
        uint8 version;
        address receiver;
        address owner;
        uint256 shares;
        uint256 minReceiveAmount;
        uint32 slippageBps;
        bytes venuePayload;
        address vault;
    }

    #[sol(all_derives)]
    struct RebalanceParams {
        uint8 version;
        address receiver;
        uint256 amount;
        uint256 minReward;
        uint32 slippageBps;
        bytes venuePayload;
        address vault;
    }
}

/// Encode/decode with a version check on the way in.
pub trait CallbackParams: Sized {
    fn version(&self) -> u8;
    fn encode(&self) -> Bytes;
    fn decode(data: &[u8]) -> Result<Self>;
}

macro_rules! callback_params {
    ($ty:ty) => {
        impl CallbackParams for $ty {
            fn version(&self) -> u8 {
                self.version
            }

            fn encode(&self) -> Bytes {
                Bytes::from(<$ty as SolType>::abi_encode(self))
            }

            fn decode(data: &[u8]) -> Result<Self> {
                let params = <$ty as SolType>::abi_decode(data).map_err(|e| {
                    OrchestratorError::MalformedParams {
                        reason: e.to_string(),
                    }
                })?;
                if params.version != PARAMS_VERSION {
                    return Err(OrchestratorError::UnsupportedParamsVersion {
                        version: params.version,
                    }
                    .into());
                }
                Ok(params)
            }
        }
    };
}

callback_params!(DepositParams);
callback_params!(WithdrawParams);
callback_params!(RebalanceParams);
