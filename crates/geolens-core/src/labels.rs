//! The fixed landmark class set and its per-class metadata.
//!
//! Class order matches the output order of the trained model, so
//! [`ClassLabel::index`] is also the position in a probability vector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of classes the engine distinguishes
pub const NUM_CLASSES: usize = 9;

/// One of the nine landmark classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassLabel {
    #[serde(rename = "Peri Bacaları")]
    FairyChimneys,
    #[serde(rename = "Divlit Volkan Konileri")]
    DivlitVolcanicCones,
    #[serde(rename = "Bazalt Sütunları")]
    BasaltColumns,
    #[serde(rename = "Lav Akıntıları")]
    LavaFlows,
    #[serde(rename = "Acısu Ofiyolitleri")]
    AcisuOphiolites,
    #[serde(rename = "Acısu Madensuyu ve Emir Kaplıcaları")]
    ThermalSprings,
    #[serde(rename = "Tarihi Kula Evleri")]
    HistoricKulaHouses,
    #[serde(rename = "Kurşunlu Camii")]
    KursunluMosque,
    #[serde(rename = "Bilgilendirme Panoları")]
    InformationPanels,
}

/// Descriptive record attached to every class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassMetadata {
    /// Category of the landmark (geological formation, religious building, ...)
    pub kind: &'static str,
    /// Educational facts, never empty
    pub facts: &'static [&'static str],
    /// Where the landmark is found
    pub location: &'static str,
}

impl ClassLabel {
    /// All labels in model output order
    pub const ALL: [ClassLabel; NUM_CLASSES] = [
        Self::FairyChimneys,
        Self::DivlitVolcanicCones,
        Self::BasaltColumns,
        Self::LavaFlows,
        Self::AcisuOphiolites,
        Self::ThermalSprings,
        Self::HistoricKulaHouses,
        Self::KursunluMosque,
        Self::InformationPanels,
    ];

    /// Position of this label in the model's output vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label at a given output position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name, also used as the serialized form
    pub fn name(self) -> &'static str {
        match self {
            Self::FairyChimneys => "Peri Bacaları",
            Self::DivlitVolcanicCones => "Divlit Volkan Konileri",
            Self::BasaltColumns => "Bazalt Sütunları",
            Self::LavaFlows => "Lav Akıntıları",
            Self::AcisuOphiolites => "Acısu Ofiyolitleri",
            Self::ThermalSprings => "Acısu Madensuyu ve Emir Kaplıcaları",
            Self::HistoricKulaHouses => "Tarihi Kula Evleri",
            Self::KursunluMosque => "Kurşunlu Camii",
            Self::InformationPanels => "Bilgilendirme Panoları",
        }
    }

    /// Geological formations (indices 0..=4)
    pub fn is_geological(self) -> bool {
        self.index() <= 4
    }

    /// Built structures (indices 6 and 7)
    pub fn is_architectural(self) -> bool {
        matches!(self, Self::HistoricKulaHouses | Self::KursunluMosque)
    }

    /// Whether two classes belong to the same semantic family
    pub fn is_related_to(self, other: ClassLabel) -> bool {
        (self.is_geological() && other.is_geological())
            || (self.is_architectural() && other.is_architectural())
    }

    /// Metadata lookup; total over the label set
    pub fn metadata(self) -> &'static ClassMetadata {
        &METADATA[self.index()]
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassLabel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.name() == s)
            .ok_or_else(|| crate::Error::internal(format!("unknown class label: {}", s)))
    }
}

static METADATA: [ClassMetadata; NUM_CLASSES] = [
    ClassMetadata {
        kind: "Jeolojik Oluşum",
        facts: &[
            "Kapadokya'daki peri bacaları, volkanik tüflerin erozyonuyla oluşmuştur.",
            "UNESCO Dünya Mirası Listesi'nde yer almaktadır.",
            "Milyon yıllar önce Erciyes, Hasandağı ve Güllüdağ'ın patlamalarıyla oluştu.",
        ],
        location: "Kapadokya, Nevşehir",
    },
    ClassMetadata {
        kind: "Volkanik Yapı",
        facts: &[
            "Kula'daki Divlit volkani, Türkiye'nin en genç volkanik yapılarından biridir.",
            "Yaklaşık 10.000-20.000 yıl önce aktifti.",
            "Jeopark statüsüyle koruma altındadır.",
        ],
        location: "Kula, Manisa",
    },
    ClassMetadata {
        kind: "Jeolojik Oluşum",
        facts: &[
            "Bazalt sütunları, lavin yavaş soğumasıyla oluşan altıgen yapılardır.",
            "Doğanın geometrik harikalarından biridir.",
            "Dünya genelinde nadir görülen jeolojik oluşumlardandır.",
        ],
        location: "Kula Jeoparkı, Manisa",
    },
    ClassMetadata {
        kind: "Volkanik Yapı",
        facts: &[
            "Lav akıntıları volkanik patlamalar sonucu oluşur.",
            "Kula bölgesi, Anadolu'nun en önemli volkanik alanlarından biridir.",
            "Bazı lav akıntıları binlerce yıl öncesine dayanır.",
        ],
        location: "Kula, Manisa",
    },
    ClassMetadata {
        kind: "Jeolojik Oluşum",
        facts: &[
            "Ofiyolitler, okyanus tabanından yükselen kayaçlardır.",
            "Milyonlarca yıl önce oluşan okyanusal kabuğun kalıntılarıdır.",
            "Jeolojik araştırmalar için önemli bir bölgedir.",
        ],
        location: "Acısu, Manisa",
    },
    ClassMetadata {
        kind: "Doğal Kaynak",
        facts: &[
            "Bölgedeki termal sular şifalı özelliklere sahiptir.",
            "Mineral açısından zengin doğal su kaynaklarıdır.",
            "Yüzyıllardır sağlık turizmi için kullanılmaktadır.",
        ],
        location: "Emir, Manisa",
    },
    ClassMetadata {
        kind: "Tarihi Yapı",
        facts: &[
            "Osmanlı dönemine ait geleneksel mimari örnekleridir.",
            "Taş ve ahşap işçiliğiyle dikkat çeker.",
            "Kültürel miras olarak koruma altındadır.",
        ],
        location: "Kula, Manisa",
    },
    ClassMetadata {
        kind: "Dini Yapı",
        facts: &[
            "Osmanlı mimarisinin önemli örneklerinden biridir.",
            "Kurşun kaplı kubbesiyle adını almıştır.",
            "Tarihi ve dini öneme sahip bir yapıdır.",
        ],
        location: "Kula, Manisa",
    },
    ClassMetadata {
        kind: "Bilgilendirme",
        facts: &[
            "Ziyaretçilere bölge hakkında bilgi sunar.",
            "Jeopark alanlarında eğitim amaçlı kullanılır.",
            "Doğa koruma bilincini artırmaya yöneliktir.",
        ],
        location: "Kula Jeoparkı",
    },
];
