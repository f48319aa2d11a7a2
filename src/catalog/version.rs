use std::cmp::Ordering;

/// Module version as published in the catalog or read from a module on disk
#[derive(Debug, Clone)]
pub struct Version {
    pub original: String,
    pub parsed: VersionType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionType {
    Numeric(Vec<u64>),
    Semantic(semver::Version),
    Unknown(String),
}

impl Version {
    pub fn parse(version: &str) -> Self {
        let trimmed = version.trim();
        let bare = trimmed
            .strip_prefix(['v', 'V'])
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
            .unwrap_or(trimmed);

        let parsed = if let Some(numeric) = Self::parse_numeric(bare) {
            VersionType::Numeric(numeric)
        } else if let Ok(v) = semver::Version::parse(bare) {
            VersionType::Semantic(v)
        } else {
            VersionType::Unknown(trimmed.to_string())
        };

        Version {
            original: version.to_string(),
            parsed,
        }
    }

    fn parse_numeric(version: &str) -> Option<Vec<u64>> {
        if version.is_empty() {
            return None;
        }

        let mut numbers = Vec::new();
        for part in version.split('.') {
            numbers.push(part.parse::<u64>().ok()?);
        }
        Some(numbers)
    }

    /// Missing trailing components count as zero, so `1.2` equals `1.2.0`.
    fn compare_components(a: &[u64], b: &[u64]) -> Ordering {
        let len = a.len().max(b.len());
        for i in 0..len {
            let av = a.get(i).copied().unwrap_or(0);
            let bv = b.get(i).copied().unwrap_or(0);
            match av.cmp(&bv) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    fn compare_numeric_with_semantic(numeric: &[u64], semantic: &semver::Version) -> Ordering {
        let core = [semantic.major, semantic.minor, semantic.patch];
        match Self::compare_components(numeric, &core) {
            // a pre-release sorts before the release it precedes
            Ordering::Equal if !semantic.pre.is_empty() => Ordering::Greater,
            other => other,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.parsed, &other.parsed) {
            (VersionType::Numeric(a), VersionType::Numeric(b)) => Self::compare_components(a, b),
            (VersionType::Semantic(a), VersionType::Semantic(b)) => a.cmp(b),
            (VersionType::Numeric(a), VersionType::Semantic(b)) => {
                Self::compare_numeric_with_semantic(a, b)
            }
            (VersionType::Semantic(a), VersionType::Numeric(b)) => {
                Self::compare_numeric_with_semantic(b, a).reverse()
            }
            _ => self.original.trim().cmp(other.original.trim()),
        }
    }
}

pub struct VersionComparator;

impl VersionComparator {
    /// Check if version `a` is newer than version `b`
    pub fn is_newer(a: &str, b: &str) -> bool {
        Version::parse(a) > Version::parse(b)
    }
}
