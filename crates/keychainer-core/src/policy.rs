//! Policy value types: accessibility, authentication policy, synchronization.
//!
//! These are plain values. The only logic here is validation of the
//! accessibility x authentication-policy cross product, performed when an
//! [`AccessControl`] artifact is built.
//!
//! # Access-control rules
//!
//! [`AccessControl::new`] rejects, with [`KeychainError::InvalidPolicy`]:
//!
//! 1. An empty flag set.
//! 2. `BIOMETRY_ANY` together with `BIOMETRY_CURRENT_SET`.
//! 3. `USER_PRESENCE` together with another biometry or passcode constraint.
//! 4. Two or more constraints without a [`Combinator`].
//! 5. A [`Combinator`] with fewer than two constraints.
//! 6. Any constraint with an `Always*` accessibility level.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::{KeychainError, Result};

// ---------------------------------------------------------------------------
// Accessibility
// ---------------------------------------------------------------------------

/// When an item's secret may be read, relative to the device lock state.
///
/// Variants are ordered from the most to the least restrictive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Only while unlocked, only if a passcode is set, never migrated.
    WhenPasscodeSetThisDeviceOnly,
    /// Only while unlocked, never migrated to another device.
    WhenUnlockedThisDeviceOnly,
    /// Only while the device is unlocked.
    WhenUnlocked,
    /// After the first unlock since boot, never migrated.
    AfterFirstUnlockThisDeviceOnly,
    /// After the first unlock since boot.
    #[default]
    AfterFirstUnlock,
    /// Always, never migrated. Deprecated by the platform.
    AlwaysThisDeviceOnly,
    /// Always. Deprecated by the platform.
    Always,
}

impl Accessibility {
    /// Every level, strictest first.
    pub const ALL: [Self; 7] = [
        Self::WhenPasscodeSetThisDeviceOnly,
        Self::WhenUnlockedThisDeviceOnly,
        Self::WhenUnlocked,
        Self::AfterFirstUnlockThisDeviceOnly,
        Self::AfterFirstUnlock,
        Self::AlwaysThisDeviceOnly,
        Self::Always,
    ];

    /// Platform code stored in the `pdmn` attribute.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::WhenPasscodeSetThisDeviceOnly => "akpu",
            Self::WhenUnlockedThisDeviceOnly => "aku",
            Self::WhenUnlocked => "ak",
            Self::AfterFirstUnlockThisDeviceOnly => "cku",
            Self::AfterFirstUnlock => "ck",
            Self::AlwaysThisDeviceOnly => "dku",
            Self::Always => "dk",
        }
    }

    /// Parse a platform code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_code() == code)
    }

    /// Whether items at this level never leave the device.
    pub fn is_this_device_only(&self) -> bool {
        matches!(
            self,
            Self::WhenPasscodeSetThisDeviceOnly
                | Self::WhenUnlockedThisDeviceOnly
                | Self::AfterFirstUnlockThisDeviceOnly
                | Self::AlwaysThisDeviceOnly
        )
    }

    fn is_always(&self) -> bool {
        matches!(self, Self::Always | Self::AlwaysThisDeviceOnly)
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WhenPasscodeSetThisDeviceOnly => "when_passcode_set_this_device_only",
            Self::WhenUnlockedThisDeviceOnly => "when_unlocked_this_device_only",
            Self::WhenUnlocked => "when_unlocked",
            Self::AfterFirstUnlockThisDeviceOnly => "after_first_unlock_this_device_only",
            Self::AfterFirstUnlock => "after_first_unlock",
            Self::AlwaysThisDeviceOnly => "always_this_device_only",
            Self::Always => "always",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Authentication policy
// ---------------------------------------------------------------------------

/// Bitset of access-control constraints, using the platform bit values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PolicyFlags(u32);

impl PolicyFlags {
    pub const USER_PRESENCE: Self = Self(1 << 0);
    pub const BIOMETRY_ANY: Self = Self(1 << 1);
    pub const BIOMETRY_CURRENT_SET: Self = Self(1 << 3);
    pub const DEVICE_PASSCODE: Self = Self(1 << 4);
    pub const PRIVATE_KEY_USAGE: Self = Self(1 << 30);
    pub const APPLICATION_PASSWORD: Self = Self(1 << 31);

    /// Flags that require the user to prove something before access.
    const CONSTRAINTS: [Self; 5] = [
        Self::USER_PRESENCE,
        Self::BIOMETRY_ANY,
        Self::BIOMETRY_CURRENT_SET,
        Self::DEVICE_PASSCODE,
        Self::APPLICATION_PASSWORD,
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of user-interaction constraints in the set.
    pub fn constraint_count(self) -> usize {
        Self::CONSTRAINTS
            .iter()
            .filter(|flag| self.contains(**flag))
            .count()
    }
}

impl BitOr for PolicyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PolicyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PolicyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(PolicyFlags, &str); 6] = [
            (PolicyFlags::USER_PRESENCE, "USER_PRESENCE"),
            (PolicyFlags::BIOMETRY_ANY, "BIOMETRY_ANY"),
            (PolicyFlags::BIOMETRY_CURRENT_SET, "BIOMETRY_CURRENT_SET"),
            (PolicyFlags::DEVICE_PASSCODE, "DEVICE_PASSCODE"),
            (PolicyFlags::PRIVATE_KEY_USAGE, "PRIVATE_KEY_USAGE"),
            (PolicyFlags::APPLICATION_PASSWORD, "APPLICATION_PASSWORD"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("PolicyFlags(empty)")
        } else {
            write!(f, "PolicyFlags({})", names.join(" | "))
        }
    }
}

/// How multiple constraints are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Every constraint must be satisfied.
    And,
    /// Any one constraint suffices.
    Or,
}

impl Combinator {
    /// Platform bit for this combinator.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Or => 1 << 14,
            Self::And => 1 << 15,
        }
    }
}

/// A set of access-control constraints plus an optional combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthenticationPolicy {
    flags: PolicyFlags,
    combinator: Option<Combinator>,
}

impl AuthenticationPolicy {
    pub fn new(flags: PolicyFlags) -> Self {
        Self {
            flags,
            combinator: None,
        }
    }

    /// Biometry or device passcode, the platform's "user presence" check.
    pub fn user_presence() -> Self {
        Self::new(PolicyFlags::USER_PRESENCE)
    }

    /// Any one of `flags` unlocks the item.
    pub fn any_of(flags: PolicyFlags) -> Self {
        Self::new(flags).with_combinator(Combinator::Or)
    }

    /// All of `flags` are required.
    pub fn all_of(flags: PolicyFlags) -> Self {
        Self::new(flags).with_combinator(Combinator::And)
    }

    pub fn with_combinator(self, combinator: Combinator) -> Self {
        Self {
            combinator: Some(combinator),
            ..self
        }
    }

    pub fn flags(&self) -> PolicyFlags {
        self.flags
    }

    pub fn combinator(&self) -> Option<Combinator> {
        self.combinator
    }

    /// Flags and combinator merged into the platform's option word.
    pub fn platform_bits(&self) -> u64 {
        let combinator = self.combinator.map_or(0, Combinator::bits);
        u64::from(self.flags.bits() | combinator)
    }
}

impl From<PolicyFlags> for AuthenticationPolicy {
    fn from(flags: PolicyFlags) -> Self {
        Self::new(flags)
    }
}

// ---------------------------------------------------------------------------
// Access control artifact
// ---------------------------------------------------------------------------

/// A validated accessibility + authentication-policy pair.
///
/// Only produced by [`AccessControl::new`], so holding one means the
/// combination passed every rule listed in the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessControl {
    accessibility: Accessibility,
    policy: AuthenticationPolicy,
}

impl AccessControl {
    pub fn new(accessibility: Accessibility, policy: AuthenticationPolicy) -> Result<Self> {
        let flags = policy.flags();

        if flags.is_empty() {
            return Err(invalid("the policy does not contain any flag"));
        }
        if flags.contains(PolicyFlags::BIOMETRY_ANY)
            && flags.contains(PolicyFlags::BIOMETRY_CURRENT_SET)
        {
            return Err(invalid(
                "biometry_any and biometry_current_set are mutually exclusive",
            ));
        }
        if flags.contains(PolicyFlags::USER_PRESENCE)
            && (flags.contains(PolicyFlags::BIOMETRY_ANY)
                || flags.contains(PolicyFlags::BIOMETRY_CURRENT_SET)
                || flags.contains(PolicyFlags::DEVICE_PASSCODE))
        {
            return Err(invalid(
                "user_presence already covers biometry and device passcode",
            ));
        }

        let constraints = flags.constraint_count();
        match (constraints, policy.combinator()) {
            (n, None) if n > 1 => {
                return Err(invalid(
                    "multiple constraints require an `and` or `or` combinator",
                ));
            }
            (n, Some(combinator)) if n < 2 => {
                return Err(invalid(&format!(
                    "the {combinator:?} combinator needs at least two constraints"
                )));
            }
            _ => {}
        }

        if constraints > 0 && accessibility.is_always() {
            return Err(invalid(&format!(
                "accessibility `{accessibility}` cannot be protected by user authentication"
            )));
        }

        Ok(Self {
            accessibility,
            policy,
        })
    }

    pub fn accessibility(&self) -> Accessibility {
        self.accessibility
    }

    pub fn policy(&self) -> AuthenticationPolicy {
        self.policy
    }

    /// Whether reading the item needs the user to authenticate.
    pub fn requires_user_interaction(&self) -> bool {
        self.policy.flags().constraint_count() > 0
    }
}

fn invalid(reason: &str) -> KeychainError {
    KeychainError::InvalidPolicy {
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// Whether an item is shared through the user's cloud keychain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronizationMode {
    /// The item stays on this device.
    LocalOnly,
    /// The item is synchronized.
    Synced,
    /// Match items in either state. Only meaningful for queries.
    Any,
}

impl SynchronizationMode {
    /// The boolean stored on the item, or `None` for [`Self::Any`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::LocalOnly => Some(false),
            Self::Synced => Some(true),
            Self::Any => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Network item types
// ---------------------------------------------------------------------------

/// Protocol of a network password item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternetProtocol {
    Ftp,
    FtpAccount,
    Http,
    Irc,
    Nntp,
    Pop3,
    Smtp,
    Socks,
    Imap,
    Ldap,
    AppleTalk,
    Afp,
    Telnet,
    Ssh,
    Ftps,
    Https,
    HttpProxy,
    HttpsProxy,
    FtpProxy,
    Smb,
    Rtsp,
    RtspProxy,
    Daap,
    Eppc,
    Ipp,
    Nntps,
    Ldaps,
    Telnets,
    Imaps,
    Ircs,
    Pop3s,
}

impl InternetProtocol {
    const ALL: [Self; 31] = [
        Self::Ftp,
        Self::FtpAccount,
        Self::Http,
        Self::Irc,
        Self::Nntp,
        Self::Pop3,
        Self::Smtp,
        Self::Socks,
        Self::Imap,
        Self::Ldap,
        Self::AppleTalk,
        Self::Afp,
        Self::Telnet,
        Self::Ssh,
        Self::Ftps,
        Self::Https,
        Self::HttpProxy,
        Self::HttpsProxy,
        Self::FtpProxy,
        Self::Smb,
        Self::Rtsp,
        Self::RtspProxy,
        Self::Daap,
        Self::Eppc,
        Self::Ipp,
        Self::Nntps,
        Self::Ldaps,
        Self::Telnets,
        Self::Imaps,
        Self::Ircs,
        Self::Pop3s,
    ];

    /// Four-character platform code stored in the `ptcl` attribute.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Ftp => "ftp ",
            Self::FtpAccount => "ftpa",
            Self::Http => "http",
            Self::Irc => "irc ",
            Self::Nntp => "nntp",
            Self::Pop3 => "pop3",
            Self::Smtp => "smtp",
            Self::Socks => "sox ",
            Self::Imap => "imap",
            Self::Ldap => "ldap",
            Self::AppleTalk => "atlk",
            Self::Afp => "afp ",
            Self::Telnet => "teln",
            Self::Ssh => "ssh ",
            Self::Ftps => "ftps",
            Self::Https => "htps",
            Self::HttpProxy => "htpx",
            Self::HttpsProxy => "htsx",
            Self::FtpProxy => "ftpx",
            Self::Smb => "smb ",
            Self::Rtsp => "rtsp",
            Self::RtspProxy => "rtsx",
            Self::Daap => "daap",
            Self::Eppc => "eppc",
            Self::Ipp => "ipp ",
            Self::Nntps => "ntps",
            Self::Ldaps => "ldps",
            Self::Telnets => "tels",
            Self::Imaps => "imps",
            Self::Ircs => "ircs",
            Self::Pop3s => "pops",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_code() == code)
    }
}

/// Authentication scheme of a network password item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternetAuthenticationType {
    Ntlm,
    Msn,
    Dpa,
    Rpa,
    HttpBasic,
    HttpDigest,
    HtmlForm,
    Default,
}

impl InternetAuthenticationType {
    const ALL: [Self; 8] = [
        Self::Ntlm,
        Self::Msn,
        Self::Dpa,
        Self::Rpa,
        Self::HttpBasic,
        Self::HttpDigest,
        Self::HtmlForm,
        Self::Default,
    ];

    /// Four-character platform code stored in the `atyp` attribute.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Ntlm => "ntlm",
            Self::Msn => "msna",
            Self::Dpa => "dpaa",
            Self::Rpa => "rpaa",
            Self::HttpBasic => "http",
            Self::HttpDigest => "httd",
            Self::HtmlForm => "form",
            Self::Default => "dflt",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_code() == code)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
