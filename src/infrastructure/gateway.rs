use crate::domain::money::Money;
use crate::domain::ports::{GatewayOrder, PaymentGateway};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// A hosted-checkout gateway that signs payments with a shared secret.
///
/// The signature over a payment is
/// `hex(HMAC-SHA256(secret, "{order_id}|{payment_id}"))`, the scheme the
/// checkout widget returns alongside the payment id. Orders are minted
/// locally; this adapter never talks to the network.
#[derive(Clone)]
pub struct HmacGateway {
    key_id: String,
    key_secret: String,
}

impl HmacGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes()).ok()?;
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Some(mac)
    }

    /// Produces the signature the hosted checkout would hand back for a
    /// captured payment.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> Result<String> {
        let mac = self.mac(order_id, payment_id).ok_or_else(|| {
            SettlementError::GatewayError("invalid gateway key secret".to_string())
        })?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for HmacGateway {
    async fn create_order(&self, amount: Money, currency: &str) -> Result<GatewayOrder> {
        if amount.is_zero() {
            return Err(SettlementError::GatewayError(
                "cannot open an order for a zero amount".to_string(),
            ));
        }
        let order = GatewayOrder {
            id: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
        };
        debug!(order_id = %order.id, amount = amount.value(), currency, "opened gateway order");
        Ok(order)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        match self.mac(order_id, payment_id) {
            Some(mac) => mac.verify_slice(&expected).is_ok(),
            None => false,
        }
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_order_ids_are_unique() {
        let gateway = HmacGateway::new("rzp_test_key", "secret");
        let a = gateway.create_order(Money::new(100), "INR").await.unwrap();
        let b = gateway.create_order(Money::new(100), "INR").await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("order_"));
        assert_eq!(a.currency, "INR");
    }

    #[tokio::test]
    async fn test_zero_amount_order_rejected() {
        let gateway = HmacGateway::new("rzp_test_key", "secret");
        assert!(matches!(
            gateway.create_order(Money::ZERO, "INR").await,
            Err(SettlementError::GatewayError(_))
        ));
    }

    #[test]
    fn test_signature_round_trip() {
        let gateway = HmacGateway::new("rzp_test_key", "secret");
        let signature = gateway.sign("order_1", "pay_1").unwrap();
        assert!(gateway.verify_signature("order_1", "pay_1", &signature));
        assert!(!gateway.verify_signature("order_2", "pay_1", &signature));
        assert!(!gateway.verify_signature("order_1", "pay_2", &signature));
        assert!(!gateway.verify_signature("order_1", "pay_1", "not-hex"));
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let ours = HmacGateway::new("rzp_test_key", "secret");
        let theirs = HmacGateway::new("rzp_test_key", "other-secret");
        let forged = theirs.sign("order_1", "pay_1").unwrap();
        assert!(!ours.verify_signature("order_1", "pay_1", &forged));
    }
}
