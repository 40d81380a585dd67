// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::model::{Affiliation, Identifier};

/// Known Danish research institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Institution {
    pub domain: &'static str,
    pub name: &'static str,
    pub abbreviation: &'static str,
    pub ror: &'static str,
}

/// Institutions recognized by email domain.
pub const INSTITUTIONS: &[Institution] = &[
    Institution {
        domain: "cbs.dk",
        name: "Copenhagen Business School",
        abbreviation: "CBS",
        ror: "04sppb023",
    },
    Institution {
        domain: "ku.dk",
        name: "University of Copenhagen",
        abbreviation: "KU",
        ror: "035b05819",
    },
    Institution {
        domain: "sdu.dk",
        name: "University of Southern Denmark",
        abbreviation: "SDU",
        ror: "03yrrjy16",
    },
    Institution {
        domain: "au.dk",
        name: "Aarhus University",
        abbreviation: "AU",
        ror: "01aj84f44",
    },
    Institution {
        domain: "dtu.dk",
        name: "Technical University of Denmark",
        abbreviation: "DTU",
        ror: "04qtj9h94",
    },
    Institution {
        domain: "aau.dk",
        name: "Aalborg University",
        abbreviation: "AAU",
        ror: "04m5j1k67",
    },
    Institution {
        domain: "ruc.dk",
        name: "Roskilde University",
        abbreviation: "RUC",
        ror: "014axpa37",
    },
    Institution {
        domain: "itu.dk",
        name: "IT University of Copenhagen",
        abbreviation: "ITU",
        ror: "02309jg23",
    },
];

impl Institution {
    /// Find institution owning domain of email address.
    ///
    /// Subdomains match too, e.g., "student.cbs.dk" belongs to "cbs.dk".
    pub fn from_email(email: &str) -> Option<&'static Self> {
        let (_, domain) = email.trim().rsplit_once('@')?;
        let domain = domain.trim().to_lowercase();

        INSTITUTIONS.iter().find(|institution| {
            domain == institution.domain
                || domain
                    .strip_suffix(institution.domain)
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    pub fn affiliation(&self) -> Affiliation {
        Affiliation {
            name: Some(self.name.into()),
            abbreviation: Some(self.abbreviation.into()),
            region: None,
            affiliation_id: Some(Identifier::new(format!("https://ror.org/{}", self.ror), "ror")),
            ..Default::default()
        }
    }
}

/// Infer affiliation from email address.
///
/// Unknown domains yield nothing rather than a guess.
pub fn affiliation_from_email(email: &str) -> Option<Affiliation> {
    Institution::from_email(email).map(Institution::affiliation)
}
