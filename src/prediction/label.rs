// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Closed label space of the anemia classifier and the canned texts attached
//! to each label.

use serde::{Deserialize, Serialize};

/// Symptom list shared by both labels
const SYMPTOMS: &str = "Sakit kepala, Mudah lelah, Pusing, Pucat, Detak jantung tidak teratur.";

/// Number of classes the classifier must output
pub const LABEL_COUNT: usize = 2;

/// Classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Anemia,
}

/// Static information shown for a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub symptoms: &'static str,
}

/// The five recommendation strings attached to a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryBundle {
    #[serde(rename = "tindakan_saran")]
    pub suggested_action: String,
    #[serde(rename = "pencegahan")]
    pub prevention: String,
    #[serde(rename = "risiko_komplikasi")]
    pub complication_risk: String,
    #[serde(rename = "perawatan_medis")]
    pub medical_care: String,
    #[serde(rename = "gayahidup_sehat")]
    pub healthy_lifestyle: String,
}

const NORMAL_INFO: LabelInfo = LabelInfo {
    name: "Normal",
    description: "Kadar hemoglobin darah berada dalam kisaran normal.",
    symptoms: SYMPTOMS,
};

const ANEMIA_INFO: LabelInfo = LabelInfo {
    name: "Terindikasi Anemia!",
    description: "Jumlah sel darah merah dalam tubuh lebih rendah dari jumlah normal.",
    symptoms: SYMPTOMS,
};

impl Label {
    /// Map a classifier output index to a label
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Normal),
            1 => Some(Label::Anemia),
            _ => None,
        }
    }

    pub fn info(self) -> &'static LabelInfo {
        match self {
            Label::Normal => &NORMAL_INFO,
            Label::Anemia => &ANEMIA_INFO,
        }
    }

    pub fn advisory(self) -> AdvisoryBundle {
        match self {
            Label::Normal => AdvisoryBundle {
                suggested_action: "Tidak ada tindakan khusus yang disarankan. Pertahankan gaya hidup sehat."
                    .to_string(),
                prevention: "Anda dapat mencegah masalah kesehatan dengan menjaga pola makan seimbang, berolahraga secara teratur, dan tidur yang cukup."
                    .to_string(),
                complication_risk: "Tidak ada risiko kesehatan yang signifikan terkait dengan kondisi ini."
                    .to_string(),
                medical_care: "Tidak memerlukan perawatan medis khusus. Tetap rutin periksa kesehatan secara berkala."
                    .to_string(),
                healthy_lifestyle: "Anda dapat memelihara gaya hidup sehat dengan mengonsumsi makanan bergizi, berolahraga secara teratur, dan mengelola stres."
                    .to_string(),
            },
            Label::Anemia => AdvisoryBundle {
                suggested_action: "Disarankan berkonsultasi dengan dokter untuk evaluasi lebih lanjut dan penanganan yang sesuai."
                    .to_string(),
                prevention: "Anda dapat mencegah anemia dengan mengonsumsi makanan yang kaya zat besi seperti daging merah, telur, dan sayuran berdaun hijau."
                    .to_string(),
                complication_risk: "Komplikasi anemia bisa berupa kelelahan kronis, masalah jantung, dan penurunan kualitas hidup."
                    .to_string(),
                medical_care: "Perawatan medis untuk anemia tergantung pada jenis dan tingkat keparahan kondisi. Ini bisa mencakup suplemen zat besi atau transfusi darah."
                    .to_string(),
                healthy_lifestyle: "Anda dapat membantu mengelola anemia dengan gaya hidup sehat, termasuk makan makanan bergizi, berolahraga secara teratur, dan mengelola stres."
                    .to_string(),
            },
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.info().name)
    }
}
