// 🎲 Synthetic Record Generator - deterministic fallback data
//
// Every random choice is drawn from an RNG seeded with SHA-256 of the
// identifier, and every date is measured back from a fixed anchor. The same
// identifier therefore always yields byte-identical records.

use crate::identifier::TaxIdentifier;
use crate::source::{
    Claim, ClaimStatus, Contribution, Employee, EmploymentStatus, EnterpriseRecord, Hospital,
    InsuranceRecordSet,
};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Social insurance contribution rate, in thousandths of salary
pub const CONTRIBUTION_RATE_PER_MILLE: i64 = 85;

/// Registrations run for ten years
pub const REGISTRATION_TERM_DAYS: i64 = 3650;

pub const MIN_EMPLOYEES: usize = 3;
pub const MAX_EMPLOYEES: usize = 15;

const ACTIVE_PROBABILITY: f64 = 0.85;

// ============================================================================
// REFERENCE TABLES
// ============================================================================

const COMPANY_PREFIXES: &[&str] = &[
    "CÔNG TY TNHH",
    "CÔNG TY CỔ PHẦN",
    "DOANH NGHIỆP TƯ NHÂN",
    "CÔNG TY LIÊN DOANH",
    "TẬP ĐOÀN",
    "TỔNG CÔNG TY",
];

/// (display, website slug)
const COMPANY_LINES: &[(&str, &str)] = &[
    ("CÔNG NGHỆ THÔNG TIN", "tech"),
    ("XÂY DỰNG", "xaydung"),
    ("THƯƠNG MẠI DỊCH VỤ", "thuongmai"),
    ("SẢN XUẤT", "sanxuat"),
    ("VẬN TẢI", "vantai"),
    ("LOGISTICS", "logistics"),
    ("DU LỊCH", "dulich"),
    ("THỦY SẢN", "thuysan"),
];

const COMPANY_PLACES: &[(&str, &str)] = &[
    ("VIỆT NAM", "vietnam"),
    ("HÀ NỘI", "hanoi"),
    ("SÀI GÒN", "saigon"),
    ("ĐÀ NẴNG", "danang"),
    ("HẢI PHÒNG", "haiphong"),
    ("CẦN THƠ", "cantho"),
    ("NHA TRANG", "nhatrang"),
    ("QUẢNG NINH", "quangninh"),
];

const BUSINESS_SECTORS: &[&str] = &[
    "Công nghệ thông tin",
    "Xây dựng",
    "Thương mại dịch vụ",
    "Sản xuất chế biến",
    "Vận tải logistics",
    "Du lịch khách sạn",
    "Giáo dục đào tạo",
    "Nông nghiệp thủy sản",
    "Dệt may",
    "Thực phẩm",
];

const COMPANY_TYPES: &[&str] = &[
    "Công ty TNHH",
    "Công ty cổ phần",
    "Doanh nghiệp tư nhân",
    "Công ty liên doanh",
];

const PROVINCES: &[&str] = &[
    "Hà Nội",
    "TP Hồ Chí Minh",
    "Đà Nẵng",
    "Hải Phòng",
    "Cần Thơ",
    "Bình Dương",
    "Đồng Nai",
    "Khánh Hòa",
    "Quảng Ninh",
    "Thừa Thiên Huế",
];

const DISTRICTS: &[&str] = &[
    "Quận 1",
    "Quận 3",
    "Quận 7",
    "Quận Ba Đình",
    "Quận Cầu Giấy",
    "Quận Đống Đa",
    "Quận Hoàn Kiếm",
    "Quận Thanh Xuân",
    "Huyện Đông Anh",
    "Huyện Gia Lâm",
];

const WARDS: &[&str] = &[
    "Phường 1",
    "Phường 2",
    "Phường Hàng Bạc",
    "Phường Hàng Gai",
    "Phường Lý Thái Tổ",
    "Phường Phúc Xá",
    "Phường Tràng Tiền",
];

const STREETS: &[&str] = &[
    "Đường Lê Lợi",
    "Đường Nguyễn Huệ",
    "Đường Trần Hưng Đạo",
    "Đường Lý Thường Kiệt",
    "Đường Hai Bà Trưng",
    "Đường Lê Duẩn",
];

const PHONE_PREFIXES: &[&str] = &["024", "028", "0236", "0225", "0251", "0274", "0292"];

const FAMILY_NAMES: &[&str] = &[
    "Nguyễn", "Trần", "Lê", "Phạm", "Hoàng", "Phan", "Vũ", "Đặng", "Bùi", "Đỗ",
];
const MIDDLE_NAMES: &[&str] = &["Văn", "Thị", "Đức", "Minh", "Quang", "Hữu", "Thanh", "Xuân"];
const GIVEN_NAMES: &[&str] = &[
    "An", "Bình", "Cường", "Dũng", "Giang", "Hải", "Khánh", "Linh", "Nam", "Phương", "Sơn", "Thảo",
];

/// (position, salary band in VND)
const POSITIONS: &[(&str, i64, i64)] = &[
    ("Giám đốc", 50_000_000, 100_000_000),
    ("Phó giám đốc", 25_000_000, 50_000_000),
    ("Trưởng phòng", 25_000_000, 50_000_000),
    ("Kỹ sư", 15_000_000, 30_000_000),
    ("Chuyên viên", 15_000_000, 30_000_000),
    ("Kế toán", 8_000_000, 20_000_000),
    ("Nhân viên", 8_000_000, 20_000_000),
    ("Nhân viên bán hàng", 8_000_000, 20_000_000),
    ("Công nhân", 8_000_000, 20_000_000),
    ("Lái xe", 8_000_000, 20_000_000),
];

/// (claim type, amount band in VND)
const CLAIM_TYPES: &[(&str, i64, i64)] = &[
    ("medical", 500_000, 5_000_000),
    ("maternity", 2_000_000, 10_000_000),
    ("sick_leave", 300_000, 2_000_000),
    ("accident", 1_000_000, 15_000_000),
];

const HOSPITALS: &[&str] = &[
    "Bệnh viện Bạch Mai",
    "Bệnh viện Chợ Rẫy",
    "Bệnh viện Việt Đức",
    "Bệnh viện K",
    "Bệnh viện Nhi Trung ương",
    "Bệnh viện Tim Hà Nội",
    "Bệnh viện 108",
    "Bệnh viện 175",
];

const SPECIALTIES: &[&str] = &[
    "Nội khoa",
    "Ngoại khoa",
    "Sản phụ khoa",
    "Nhi khoa",
    "Tim mạch",
    "Thần kinh",
    "Da liễu",
    "Mắt",
    "Tai mũi họng",
    "Xương khớp",
];

// ============================================================================
// GENERATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    anchor: NaiveDate,
}

impl SyntheticGenerator {
    pub fn new() -> Self {
        SyntheticGenerator {
            anchor: default_anchor(),
        }
    }

    /// Generator measuring dates back from a different anchor day
    pub fn with_anchor(anchor: NaiveDate) -> Self {
        SyntheticGenerator { anchor }
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn enterprise(&self, id: &TaxIdentifier) -> EnterpriseRecord {
        let mut rng = seeded_rng("enterprise", id);

        let prefix = pick(&mut rng, COMPANY_PREFIXES);
        let (line, line_slug) = pick_pair(&mut rng, COMPANY_LINES);
        let (place, place_slug) = pick_pair(&mut rng, COMPANY_PLACES);
        let name = format!("{} {} {}", prefix, line, place);

        let province = pick(&mut rng, PROVINCES);
        let district = pick(&mut rng, DISTRICTS);
        let ward = pick(&mut rng, WARDS);
        let street = pick(&mut rng, STREETS);
        let number: u32 = rng.gen_range(1..=999);
        let address = format!("Số {}, {}, {}, {}, {}", number, street, ward, district, province);

        let phone_prefix = pick(&mut rng, PHONE_PREFIXES);
        let suffix = digits(&mut rng, 7);
        let phone = format!("{}.{}.{}", phone_prefix, &suffix[..3], &suffix[3..]);

        let registered = self.anchor - Duration::days(rng.gen_range(365..=3650));
        let expiry = registered + Duration::days(REGISTRATION_TERM_DAYS);
        let revenue: i64 = rng.gen_range(1_000_000_000..=100_000_000_000);

        EnterpriseRecord {
            tax_code: id.as_str().to_string(),
            name,
            address,
            sector: pick(&mut rng, BUSINESS_SECTORS).to_string(),
            company_type: pick(&mut rng, COMPANY_TYPES).to_string(),
            phone,
            website: format!("https://www.{}{}.com.vn", line_slug, place_slug),
            registration_date: registered.format("%Y-%m-%d").to_string(),
            expiry_date: expiry.format("%Y-%m-%d").to_string(),
            revenue: Some(revenue as f64),
            bank_account: digits(&mut rng, 10),
            province: province.to_string(),
            district: district.to_string(),
            ward: ward.to_string(),
        }
    }

    /// Employees, contributions, claims and hospitals for one employer.
    /// Contributions and claims only reference generated employees.
    pub fn insurance(&self, id: &TaxIdentifier) -> InsuranceRecordSet {
        let mut rng = seeded_rng("insurance", id);
        let mst = id.as_str();

        let employees = self.employees(&mut rng, mst);
        let contributions = self.contributions(&mut rng, mst, &employees);
        let claims = self.claims(&mut rng, mst, &employees);
        let hospitals = hospitals(&mut rng);

        InsuranceRecordSet {
            snapshot_date: self.anchor,
            employees,
            contributions,
            claims,
            hospitals,
        }
    }

    fn employees(&self, rng: &mut StdRng, mst: &str) -> Vec<Employee> {
        let count = rng.gen_range(MIN_EMPLOYEES..=MAX_EMPLOYEES);

        (0..count)
            .map(|i| {
                let full_name = format!(
                    "{} {} {}",
                    pick(rng, FAMILY_NAMES),
                    pick(rng, MIDDLE_NAMES),
                    pick(rng, GIVEN_NAMES)
                );
                let (position, low, high) = POSITIONS
                    .choose(rng)
                    .copied()
                    .unwrap_or(("Nhân viên", 8_000_000, 20_000_000));
                let salary = round_thousand(rng.gen_range(low..=high));

                let active = rng.gen_bool(ACTIVE_PROBABILITY);
                // inactive staff left long enough ago to have no recent contributions
                let days_employed = if active {
                    rng.gen_range(30..=1095)
                } else {
                    rng.gen_range(500..=1095)
                };

                Employee {
                    employee_id: format!("EMP_{:03}_{}", i + 1, mst),
                    full_name,
                    position: position.to_string(),
                    salary,
                    start_date: self.days_back(days_employed),
                    status: if active {
                        EmploymentStatus::Active
                    } else {
                        EmploymentStatus::Inactive
                    },
                }
            })
            .collect()
    }

    fn contributions(&self, rng: &mut StdRng, mst: &str, employees: &[Employee]) -> Vec<Contribution> {
        let mut contributions = Vec::new();

        for employee in employees {
            let days_employed = self.days_since(&employee.start_date);
            let amount = employee.salary * CONTRIBUTION_RATE_PER_MILLE / 1000;

            // active: monthly, newest first, inside the last year
            // inactive: monthly, ending 400 days before the anchor
            let (offset, months_available) = if employee.is_active() {
                (15, (days_employed / 30).max(1))
            } else {
                (400, ((days_employed - 400) / 30).max(1))
            };
            let months = rng.gen_range(1..=months_available.min(12));

            for k in 0..months {
                contributions.push(Contribution {
                    contribution_id: format!("CONT_{:03}_{}", contributions.len() + 1, mst),
                    employee_id: employee.employee_id.clone(),
                    amount,
                    date: self.days_back(offset + 30 * k),
                    contribution_type: "social_insurance".to_string(),
                });
            }
        }

        contributions
    }

    fn claims(&self, rng: &mut StdRng, mst: &str, employees: &[Employee]) -> Vec<Claim> {
        let claimants = rng.gen_range(1..=employees.len().clamp(1, 5));
        let mut claims = Vec::new();

        let claimants: Vec<&Employee> = employees.choose_multiple(rng, claimants).collect();

        for employee in claimants {
            for _ in 0..rng.gen_range(1..=3) {
                let (claim_type, low, high) = CLAIM_TYPES
                    .choose(rng)
                    .copied()
                    .unwrap_or(("medical", 500_000, 5_000_000));
                let status = match rng.gen_range(0..100) {
                    0..=69 => ClaimStatus::Approved,
                    70..=94 => ClaimStatus::Pending,
                    _ => ClaimStatus::Rejected,
                };

                claims.push(Claim {
                    claim_id: format!("CLAIM_{:03}_{}", claims.len() + 1, mst),
                    employee_id: employee.employee_id.clone(),
                    claim_type: claim_type.to_string(),
                    amount: round_thousand(rng.gen_range(low..=high)),
                    date: self.days_back(rng.gen_range(1..=180)),
                    status,
                });
            }
        }

        claims
    }

    fn days_back(&self, days: i64) -> String {
        (self.anchor - Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn days_since(&self, date: &str) -> i64 {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| (self.anchor - d).num_days())
            .unwrap_or(0)
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn hospitals(rng: &mut StdRng) -> Vec<Hospital> {
    let count = rng.gen_range(2..=5);

    HOSPITALS
        .choose_multiple(rng, count)
        .copied()
        .collect::<Vec<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let address = format!(
                "Số {}, {}, {}",
                rng.gen_range(1..=999),
                pick(rng, STREETS),
                pick(rng, PROVINCES)
            );
            let suffix = digits(rng, 7);
            let specialties_count = rng.gen_range(2..=5);

            Hospital {
                hospital_id: format!("HOSP_{:03}", i + 1),
                name: name.to_string(),
                address,
                phone: format!("{}-{}-{}", pick(rng, PHONE_PREFIXES), &suffix[..3], &suffix[3..]),
                specialties: SPECIALTIES
                    .choose_multiple(rng, specialties_count)
                    .map(|s| s.to_string())
                    .collect(),
            }
        })
        .collect()
}

/// Day every synthetic date is measured back from
pub fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

fn seeded_rng(domain: &str, id: &TaxIdentifier) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(b":");
    hasher.update(id.as_str().as_bytes());

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    StdRng::from_seed(seed)
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

fn pick_pair<'a>(rng: &mut StdRng, options: &[(&'a str, &'a str)]) -> (&'a str, &'a str) {
    options.choose(rng).copied().unwrap_or_default()
}

fn digits(rng: &mut StdRng, count: usize) -> String {
    (0..count)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn round_thousand(amount: i64) -> i64 {
    amount / 1000 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn id(raw: &str) -> TaxIdentifier {
        TaxIdentifier::parse(raw).unwrap()
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = SyntheticGenerator::new();
        let a = serde_json::to_string(&generator.insurance(&id("0101234567"))).unwrap();
        let b = serde_json::to_string(&generator.insurance(&id("0101234567"))).unwrap();
        assert_eq!(a, b);

        let e1 = serde_json::to_string(&generator.enterprise(&id("0101234567"))).unwrap();
        let e2 = serde_json::to_string(&generator.enterprise(&id("0101234567"))).unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_different_identifiers_differ() {
        let generator = SyntheticGenerator::new();
        let a = generator.enterprise(&id("0101234567"));
        let b = generator.enterprise(&id("0312345678"));
        assert_ne!(a, b);
        assert_eq!(b.tax_code, "0312345678");
    }

    #[test]
    fn test_enterprise_record_is_complete() {
        let record = SyntheticGenerator::new().enterprise(&id("0101234567"));
        assert!(record.is_complete());

        let registered = NaiveDate::parse_from_str(&record.registration_date, "%Y-%m-%d").unwrap();
        let expiry = NaiveDate::parse_from_str(&record.expiry_date, "%Y-%m-%d").unwrap();
        assert!(expiry >= default_anchor());
        assert!(expiry > registered);

        let phone_digits = record.phone.chars().filter(|c| c.is_ascii_digit()).count();
        assert!((10..=11).contains(&phone_digits));
        assert!(record.website.is_ascii());
    }

    #[test]
    fn test_insurance_set_is_consistent() {
        for raw in ["0101234567", "0312345678", "0109876543210", "4000000001"] {
            let set = SyntheticGenerator::new().insurance(&id(raw));

            assert!((MIN_EMPLOYEES..=MAX_EMPLOYEES).contains(&set.employees.len()));
            assert!(set.verify_integrity().is_ok());
            assert!((2..=5).contains(&set.hospitals.len()));

            let ids: HashSet<_> = set.employees.iter().map(|e| e.employee_id.as_str()).collect();
            assert_eq!(ids.len(), set.employees.len());

            for contribution in &set.contributions {
                let employee = set
                    .employees
                    .iter()
                    .find(|e| e.employee_id == contribution.employee_id)
                    .unwrap();
                assert_eq!(contribution.amount, employee.salary * 85 / 1000);
                assert!(contribution.date >= employee.start_date);
            }

            for claim in &set.claims {
                assert!((300_000..=15_000_000).contains(&claim.amount));
            }
        }
    }

    #[test]
    fn test_contribution_dates_respect_status() {
        let generator = SyntheticGenerator::new();
        let set = generator.insurance(&id("0101234567"));
        let window_start = generator.anchor() - Duration::days(365);

        for contribution in &set.contributions {
            let date = NaiveDate::parse_from_str(&contribution.date, "%Y-%m-%d").unwrap();
            let employee = set
                .employees
                .iter()
                .find(|e| e.employee_id == contribution.employee_id)
                .unwrap();
            if employee.is_active() {
                assert!(date > window_start);
            } else {
                assert!(date < window_start);
            }
        }
    }
}
