//! Bank account aggregate
//!
//! The only aggregate the consistency core ships with. Mutators check the
//! business rules first and touch state only when the rule holds, so a
//! rejected withdrawal or deposit leaves the account exactly as it was.

use steadfast_concurrency::{Aggregate, VersionToken};
use steadfast_core::{DomainError, EntityId, Money, Version};

/// A bank account with a non-negative balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    id: EntityId,
    balance: Money,
    version: Version,
}

impl BankAccount {
    /// A new account at [`Version::INITIAL`]
    ///
    /// The balance is taken as given; use [`try_open`](Self::try_open) for
    /// amounts that come from outside.
    pub fn open(id: impl Into<EntityId>, balance: Money) -> Self {
        Self::restore(id, balance, Version::INITIAL)
    }

    /// A new account at [`Version::INITIAL`], rejecting a negative balance
    pub fn try_open(id: impl Into<EntityId>, balance: Money) -> Result<Self, DomainError> {
        Self::try_restore(id, balance, Version::INITIAL)
    }

    /// Rebuild an account from persisted state
    pub fn restore(id: impl Into<EntityId>, balance: Money, version: Version) -> Self {
        Self {
            id: id.into(),
            balance,
            version,
        }
    }

    /// Rebuild an account, rejecting a negative balance
    pub fn try_restore(
        id: impl Into<EntityId>,
        balance: Money,
        version: Version,
    ) -> Result<Self, DomainError> {
        if balance.is_negative() {
            return Err(DomainError::NegativeBalance(balance));
        }
        Ok(Self::restore(id, balance, version))
    }

    /// Account identity
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Current balance
    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Take `amount` out of the account
    ///
    /// # Errors
    ///
    /// - [`DomainError::NonPositiveAmount`] if `amount <= 0`
    /// - [`DomainError::InsufficientFunds`] if `amount` exceeds the balance
    pub fn withdraw(&mut self, amount: Money) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        if amount > self.balance {
            return Err(DomainError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(DomainError::Overflow)?;
        Ok(())
    }

    /// Put `amount` into the account
    pub fn deposit(&mut self, amount: Money) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(DomainError::Overflow)?;
        Ok(())
    }
}

impl Aggregate for BankAccount {
    const KIND: &'static str = "bank_account";

    fn entity_id(&self) -> &EntityId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn advance_version(&mut self, _token: VersionToken) {
        self.version = self.version.next();
    }
}
