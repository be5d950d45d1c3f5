//! Allocation handles and alignment requirements.
//!
//! An [`Allocation`] is the address of the first byte of a region handed
//! out by an arena. Addresses are taken from the real backing storage, so
//! alignment checks are meaningful, but the handle itself grants no access:
//! bytes are read and written through the arena that produced it.

use std::fmt;
use std::num::NonZeroUsize;

/// Largest alignment any arena will honour, in bytes.
pub const MAX_ALIGNMENT: usize = 64;

/// Opaque handle to a live allocation.
///
/// Handles are plain addresses: copying one does not duplicate the memory
/// and dropping one does not free it. `Option<Allocation>` is the same size
/// as `Allocation`, with `None` playing the role of a null result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Allocation(NonZeroUsize);

impl Allocation {
    /// Wrap a raw address. Returns `None` for the null address.
    pub fn from_addr(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    /// The address of the first byte.
    pub fn addr(self) -> usize {
        self.0.get()
    }

    /// A handle `bytes` past this one.
    ///
    /// Saturates instead of wrapping; callers only offset within regions
    /// they already own.
    pub fn offset(self, bytes: usize) -> Self {
        Self(self.0.saturating_add(bytes))
    }

    /// Whether this address satisfies `alignment`.
    pub fn is_aligned(self, alignment: Alignment) -> bool {
        alignment.is_aligned(self.addr())
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Alignment requirement for an allocation.
///
/// `None` means "no requirement". When passed as a per-call override it
/// means "use the arena's default".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Alignment {
    /// No alignment requirement.
    #[default]
    None,
    /// 4-byte alignment.
    Bytes4,
    /// 8-byte alignment.
    Bytes8,
    /// 16-byte alignment.
    Bytes16,
    /// 64-byte alignment (cache line).
    Bytes64,
}

impl Alignment {
    /// Every alignment, weakest first.
    pub const ALL: [Alignment; 5] = [
        Alignment::None,
        Alignment::Bytes4,
        Alignment::Bytes8,
        Alignment::Bytes16,
        Alignment::Bytes64,
    ];

    /// Alignment in bytes. `None` is reported as 1.
    pub const fn bytes(self) -> usize {
        match self {
            Self::None => 1,
            Self::Bytes4 => 4,
            Self::Bytes8 => 8,
            Self::Bytes16 => 16,
            Self::Bytes64 => 64,
        }
    }

    /// Look up the alignment for a byte count. 0 and 1 map to `None`.
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            0 | 1 => Some(Self::None),
            4 => Some(Self::Bytes4),
            8 => Some(Self::Bytes8),
            16 => Some(Self::Bytes16),
            64 => Some(Self::Bytes64),
            _ => None,
        }
    }

    /// Whether this is the "no requirement" value.
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Resolve a per-call override against an arena default.
    pub fn or(self, default: Alignment) -> Alignment {
        if self.is_none() {
            default
        } else {
            self
        }
    }

    /// Padding needed to bring `addr` up to this alignment.
    pub fn padding_for(self, addr: usize) -> usize {
        let align = self.bytes();
        (align - addr % align) % align
    }

    /// Whether `addr` already satisfies this alignment.
    pub fn is_aligned(self, addr: usize) -> bool {
        addr % self.bytes() == 0
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            other => write!(f, "{}-byte", other.bytes()),
        }
    }
}
