pub mod program_ids {
    pub const CLMM_V1: &str = "CLMMv1xBx9fbgsfYT3aGP8c3Tvs3WRLgNcDuZCCVgj7R";
    pub const CLMM_V2: &str = "CLMMv2qWkdk4e3sCAkHfvXp4vL9yLpy8ujN3NeGHDy2B";
    pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
}

/// V1 instruction opcodes (first payload byte).
pub mod v1_opcodes {
    pub const SWAP: u8 = 1;
    pub const INCREASE_LIQUIDITY: u8 = 2;
    pub const DECREASE_LIQUIDITY: u8 = 3;
    pub const CLAIM: u8 = 4;
}

/// Positional account layouts for V1 instructions.
pub mod v1_layouts {
    pub mod swap {
        pub const POOL: usize = 0;
        pub const USER: usize = 1;
        pub const USER_TOKEN_IN: usize = 2;
        pub const USER_TOKEN_OUT: usize = 3;
        pub const VAULT_IN: usize = 4;
        pub const VAULT_OUT: usize = 5;
        pub const MIN_ACCOUNTS: usize = 6;
    }

    pub mod increase_liquidity {
        pub const POOL: usize = 0;
        pub const OWNER: usize = 1;
        pub const POSITION: usize = 2;
        pub const USER_TOKEN_A: usize = 3;
        pub const USER_TOKEN_B: usize = 4;
        pub const VAULT_A: usize = 5;
        pub const VAULT_B: usize = 6;
        pub const MIN_ACCOUNTS: usize = 7;
    }

    /// Shared by DecreaseLiquidity and Claim.
    pub mod decrease_liquidity {
        pub const POOL: usize = 0;
        pub const OWNER: usize = 1;
        pub const POSITION: usize = 2;
        pub const VAULT_A: usize = 3;
        pub const VAULT_B: usize = 4;
        pub const USER_TOKEN_A: usize = 5;
        pub const USER_TOKEN_B: usize = 6;
        pub const MIN_ACCOUNTS: usize = 7;
    }
}

/// SPL token program opcodes seen in settlement inner instructions.
pub mod token_opcodes {
    pub const TRANSFER: u8 = 3;
    /// Byte offset of the little-endian u64 amount in a transfer payload.
    pub const AMOUNT_OFFSET: usize = 1;
}

pub mod event_log {
    pub const PROGRAM_DATA_PREFIX: &str = "Program data: ";
    pub const EVENT_NAMESPACE: &str = "event";
    pub const DISCRIMINATOR_LEN: usize = 8;
}

pub mod event_names {
    pub const SWAP: &str = "SwapEvent";
    pub const INCREASE_LIQUIDITY: &str = "IncreaseLiquidityEvent";
    pub const DECREASE_LIQUIDITY: &str = "DecreaseLiquidityEvent";
    pub const COLLECT_FEE: &str = "CollectFeeEvent";
}

/// Denominator for `PoolConfig::fee_rate`.
pub const FEE_RATE_DENOMINATOR: u32 = 1_000_000;
