//! Seed lists on the command line: `a-b` (inclusive) or `a,b,c`.

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumRange(pub Vec<u32>);

impl FromStr for NumRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((lo, hi)) = s.split_once('-') {
            let lo: u32 = lo.trim().parse().map_err(|_| format!("invalid range start in {s:?}"))?;
            let hi: u32 = hi.trim().parse().map_err(|_| format!("invalid range end in {s:?}"))?;
            if hi < lo {
                return Err(format!("range end is before range start in {s:?}"));
            }
            return Ok(Self((lo..=hi).collect()));
        }

        let values = s
            .split(',')
            .map(|v| v.trim().parse::<u32>().map_err(|_| format!("invalid number {v:?} in {s:?}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_inclusive() {
        assert_eq!("6600-6603".parse::<NumRange>().unwrap().0, vec![6600, 6601, 6602, 6603]);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!("66, 230,389".parse::<NumRange>().unwrap().0, vec![66, 230, 389]);
        assert_eq!("7".parse::<NumRange>().unwrap().0, vec![7]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc".parse::<NumRange>().is_err());
        assert!("5-2".parse::<NumRange>().is_err());
        assert!("1,,2".parse::<NumRange>().is_err());
    }
}
