//! Letter codes for named boolean attributes.
//!
//! Every entity in a test graph (graph, node, import) carries a small fixed
//! set of boolean flags. In the text form each flag is written as a single
//! lowercase letter: the first letter after the `is`/`has` prefix of its
//! name, so `isModule` is `m` and `hasTopLevelAwait` is `t`. A token is the
//! concatenation of the letters of all set flags, in table order.
//!
//! Letters never collide with the digits used for indices and counts, so a
//! decoder can greedily consume letters and hand the remainder to a number
//! parser.
//!
//! Flag sets are plain structs declared with [`flag_set!`]. The letter table
//! behind each struct is a `static` built by the `const fn`
//! [`FlagTable::new`], so a duplicate letter is a compile error rather than a
//! runtime surprise. [`FlagTable::try_new`] performs the same derivation at
//! runtime for callers that build tables from dynamic names.

use std::fmt;

use crate::error::FlagError;

/// One row of a flag table: the attribute name and its letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagEntry {
    pub name: &'static str,
    pub letter: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFault {
    MalformedName { index: usize },
    DuplicateLetter { first: usize, second: usize },
}

/// Ordered mapping between attribute names and their letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagTable<const N: usize> {
    entries: [FlagEntry; N],
}

impl<const N: usize> FlagTable<N> {
    /// Builds a table in a const context.
    ///
    /// Panics (at compile time when used to initialize a `static`) if a name
    /// lacks the `is`/`has` prefix or two names derive the same letter.
    pub const fn new(names: [&'static str; N]) -> Self {
        match Self::build(names) {
            Ok(table) => table,
            Err(TableFault::MalformedName { .. }) => {
                panic!("flag names must be `is` or `has` followed by a letter")
            }
            Err(TableFault::DuplicateLetter { .. }) => {
                panic!("two flag names derive the same letter")
            }
        }
    }

    /// Builds a table at runtime, reporting collisions as errors.
    pub fn try_new(names: [&'static str; N]) -> Result<Self, FlagError> {
        Self::build(names).map_err(|fault| match fault {
            TableFault::MalformedName { index } => FlagError::MalformedName {
                name: names[index].to_string(),
            },
            TableFault::DuplicateLetter { first, second } => FlagError::DuplicateFlag {
                letter: derive_letter(names[first]).unwrap_or('?'),
                first: names[first].to_string(),
                second: names[second].to_string(),
            },
        })
    }

    const fn build(names: [&'static str; N]) -> Result<Self, TableFault> {
        let mut entries = [FlagEntry {
            name: "",
            letter: 'a',
        }; N];

        let mut i = 0;
        while i < N {
            let letter = match derive_letter(names[i]) {
                Some(letter) => letter,
                None => return Err(TableFault::MalformedName { index: i }),
            };
            let mut j = 0;
            while j < i {
                if entries[j].letter as u32 == letter as u32 {
                    return Err(TableFault::DuplicateLetter { first: j, second: i });
                }
                j += 1;
            }
            entries[i] = FlagEntry {
                name: names[i],
                letter,
            };
            i += 1;
        }

        Ok(FlagTable { entries })
    }

    /// Returns the table rows in declaration order.
    pub const fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }
}

/// Number of names in a flag list; used to size a table's const parameter.
pub const fn count_names(names: &[&str]) -> usize {
    names.len()
}

/// Derives the letter for a flag name: the first character after the `is` or
/// `has` prefix, lowercased. Returns `None` for names without a prefix or
/// without a letter after it.
pub const fn derive_letter(name: &str) -> Option<char> {
    let bytes = name.as_bytes();
    let skip = if has_prefix(bytes, b"is") {
        2
    } else if has_prefix(bytes, b"has") {
        3
    } else {
        return None;
    };
    if bytes.len() <= skip {
        return None;
    }
    let letter = bytes[skip].to_ascii_lowercase();
    if letter.is_ascii_lowercase() {
        Some(letter as char)
    } else {
        None
    }
}

const fn has_prefix(bytes: &[u8], prefix: &[u8]) -> bool {
    if bytes.len() < prefix.len() {
        return false;
    }
    let mut i = 0;
    while i < prefix.len() {
        if bytes[i] != prefix[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// A fixed set of named boolean attributes with a static letter table.
pub trait FlagSet: Copy + Default + PartialEq + fmt::Debug {
    /// Table rows, in field order.
    fn table() -> &'static [FlagEntry];

    /// Value of the flag at `index` in the table. Out-of-range is `false`.
    fn get(&self, index: usize) -> bool;

    /// Sets the flag at `index` in the table. Out-of-range is ignored.
    fn set(&mut self, index: usize, value: bool);

    /// True when no flag is set.
    fn is_empty(&self) -> bool {
        (0..Self::table().len()).all(|index| !self.get(index))
    }
}

/// Encodes the set flags as a letter token, in table order.
pub fn encode<F: FlagSet>(flags: &F) -> String {
    F::table()
        .iter()
        .enumerate()
        .filter(|(index, _)| flags.get(*index))
        .map(|(_, entry)| entry.letter)
        .collect()
}

/// Decodes a leading letter token.
///
/// Consumes every leading ASCII letter, maps each to its flag, and returns
/// the flag set together with the unconsumed remainder of `input`. Letters
/// may appear in any order but at most once.
pub fn decode<F: FlagSet>(input: &str) -> Result<(F, &str), FlagError> {
    let split = input
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (letters, rest) = input.split_at(split);

    let mut flags = F::default();
    for letter in letters.chars() {
        let index = F::table()
            .iter()
            .position(|entry| entry.letter == letter)
            .ok_or(FlagError::UnknownFlag { letter })?;
        if flags.get(index) {
            return Err(FlagError::RepeatedFlag { letter });
        }
        flags.set(index, true);
    }

    Ok((flags, rest))
}

/// Declares a flag-set struct with one `bool` field per flag, its static
/// letter table, and a `Display` impl that writes the letter token.
macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_meta:meta])* $field:ident => $flag:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        $vis struct $name {
            $( $(#[$field_meta])* pub $field: bool, )+
        }

        impl $crate::flags::FlagSet for $name {
            fn table() -> &'static [$crate::flags::FlagEntry] {
                static TABLE: $crate::flags::FlagTable<
                    { $crate::flags::count_names(&[$($flag),+]) },
                > = $crate::flags::FlagTable::new([$($flag),+]);
                TABLE.entries()
            }

            fn get(&self, index: usize) -> bool {
                [$(self.$field),+].get(index).copied().unwrap_or(false)
            }

            fn set(&mut self, index: usize, value: bool) {
                if let Some(slot) = [$(&mut self.$field),+].into_iter().nth(index) {
                    *slot = value;
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&$crate::flags::encode(self))
            }
        }
    };
}

pub(crate) use flag_set;
