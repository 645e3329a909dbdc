use crate::domain::booking::BookingStatus;
use crate::domain::coupon::Coupon;
use crate::domain::money::Money;
use crate::domain::user::Role;
use crate::domain::wallet::{WalletConfig, WalletOffer};
use crate::error::{Result, SettlementError};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

fn default_role() -> Role {
    Role::Customer
}

fn default_true() -> bool {
    true
}

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterUser {
        id: String,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default = "default_role")]
        role: Role,
    },
    AddProduct {
        id: String,
        name: String,
        price: Money,
    },
    AddProfessional {
        id: String,
        name: String,
        #[serde(default = "default_true")]
        active: bool,
        #[serde(default)]
        user_id: Option<String>,
    },
    CreateCoupon(Coupon),
    CreateOffer(WalletOffer),
    SetWalletConfig(WalletConfig),
    CreateOrder {
        user: String,
        booking: String,
        product_id: String,
        address: String,
        #[serde(default)]
        coupon_code: Option<String>,
        #[serde(default)]
        use_wallet: bool,
    },
    /// Confirms a gateway payment. The booking owner acts unless `user` says
    /// otherwise; a missing signature is produced by the runner.
    Pay {
        booking: String,
        payment_id: String,
        #[serde(default)]
        signature: Option<String>,
        #[serde(default)]
        user: Option<String>,
    },
    ConfirmWallet {
        booking: String,
        #[serde(default)]
        user: Option<String>,
    },
    ValidateCoupon {
        code: String,
        cart_value: Money,
    },
    UpdateStatus {
        user: String,
        booking: String,
        status: BookingStatus,
    },
    RewardReview {
        user: String,
        booking: String,
    },
    CreateTopup {
        user: String,
        topup: String,
        offer_id: String,
    },
    PayTopup {
        topup: String,
        payment_id: String,
        #[serde(default)]
        signature: Option<String>,
    },
    Credit {
        user: String,
        to: String,
        amount: Money,
        #[serde(default)]
        description: Option<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RegisterUser { .. } => "register_user",
            Command::AddProduct { .. } => "add_product",
            Command::AddProfessional { .. } => "add_professional",
            Command::CreateCoupon(_) => "create_coupon",
            Command::CreateOffer(_) => "create_offer",
            Command::SetWalletConfig(_) => "set_wallet_config",
            Command::CreateOrder { .. } => "create_order",
            Command::Pay { .. } => "pay",
            Command::ConfirmWallet { .. } => "confirm_wallet",
            Command::ValidateCoupon { .. } => "validate_coupon",
            Command::UpdateStatus { .. } => "update_status",
            Command::RewardReview { .. } => "reward_review",
            Command::CreateTopup { .. } => "create_topup",
            Command::PayTopup { .. } => "pay_topup",
            Command::Credit { .. } => "credit",
        }
    }
}

/// Reads commands from a JSON-lines source.
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// yields an error carrying its line number and does not stop the stream.
pub struct CommandReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and parses commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => return Some(Err(SettlementError::from(err))),
                };
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return None;
                }
                Some(serde_json::from_str(trimmed).map_err(|err| {
                    SettlementError::ValidationError(format!("line {}: {err}", index + 1))
                }))
            })
    }
}
