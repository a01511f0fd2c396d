//! Passcode generators: HOTP consumes its counter, TOTP is a pure function of
//! the wall clock.

use crate::error::{DecodeError, Error};
use crate::token::{Otp, Passcode, TokenKind};
use time::OffsetDateTime;

/// Counter-based generator. Every call to [`Hotp::generate`] uses the current
/// counter and then moves the stored token to the next one.
#[derive(Debug, Clone)]
pub struct Hotp {
    otp: Otp,
    counter: u64,
}

impl Hotp {
    pub fn new(otp: Otp) -> Result<Self, Error> {
        match otp.token.kind {
            TokenKind::Counter(counter) => Ok(Self { otp, counter }),
            TokenKind::TimeStep(_) => Err(Error::NotCounterBased(otp.id)),
        }
    }

    pub fn otp(&self) -> &Otp {
        &self.otp
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn generate(&mut self) -> Passcode {
        let passcode = self.otp.passcode(&self.counter.to_be_bytes());
        self.counter = self.counter.wrapping_add(1);
        self.otp.token = self.otp.token.with_kind(TokenKind::Counter(self.counter));
        passcode
    }
}

/// Time-based generator.
#[derive(Debug, Clone)]
pub struct Totp {
    otp: Otp,
    period: i32,
}

impl Totp {
    pub fn new(otp: Otp) -> Result<Self, Error> {
        match otp.token.kind {
            TokenKind::TimeStep(period) if period > 0 => Ok(Self { otp, period }),
            TokenKind::TimeStep(period) => {
                Err(DecodeError::InvalidPeriodValue(period.to_string()).into())
            }
            TokenKind::Counter(_) => Err(Error::NotTimeBased(otp.id)),
        }
    }

    pub fn otp(&self) -> &Otp {
        &self.otp
    }

    pub fn period(&self) -> i32 {
        self.period
    }

    /// floor(unix_seconds / period); instants before the epoch clamp to step 0.
    pub fn time_step(&self, now: OffsetDateTime) -> u64 {
        now.unix_timestamp().max(0).div_euclid(i64::from(self.period)) as u64
    }

    pub fn generate(&self, now: OffsetDateTime) -> Passcode {
        self.otp.passcode(&self.time_step(now).to_be_bytes())
    }
}

/// One entry of the token list: a generator of either kind.
#[derive(Debug, Clone)]
pub enum Generator {
    Counter(Hotp),
    TimeStep(Totp),
}

impl Generator {
    pub fn new(otp: Otp) -> Result<Self, Error> {
        match otp.token.kind {
            TokenKind::Counter(_) => Hotp::new(otp).map(Generator::Counter),
            TokenKind::TimeStep(_) => Totp::new(otp).map(Generator::TimeStep),
        }
    }

    pub fn otp(&self) -> &Otp {
        match self {
            Generator::Counter(hotp) => hotp.otp(),
            Generator::TimeStep(totp) => totp.otp(),
        }
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, Generator::Counter(_))
    }

    /// Produce the next passcode. Advances the counter for HOTP.
    pub fn generate(&mut self, now: OffsetDateTime) -> Passcode {
        match self {
            Generator::Counter(hotp) => hotp.generate(),
            Generator::TimeStep(totp) => totp.generate(now),
        }
    }
}
