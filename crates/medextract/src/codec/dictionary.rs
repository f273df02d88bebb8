//! Keyword and VR lookup for common public tags
//!
//! Covers the identification, patient, study, series, equipment and image
//! pixel modules plus the functional groups used for multi-frame images.
//! Implicit VR files need the VR from here; anything unlisted is read as `UN`.

use super::record::{Tag, Vr};

struct Entry {
    tag: Tag,
    vr: Vr,
    keyword: &'static str,
}

const fn entry(group: u16, element: u16, vr: Vr, keyword: &'static str) -> Entry {
    Entry {
        tag: Tag::new(group, element),
        vr,
        keyword,
    }
}

// Sorted by tag.
static ENTRIES: &[Entry] = &[
    entry(0x0002, 0x0000, Vr::UL, "FileMetaInformationGroupLength"),
    entry(0x0002, 0x0001, Vr::OB, "FileMetaInformationVersion"),
    entry(0x0002, 0x0002, Vr::UI, "MediaStorageSOPClassUID"),
    entry(0x0002, 0x0003, Vr::UI, "MediaStorageSOPInstanceUID"),
    entry(0x0002, 0x0010, Vr::UI, "TransferSyntaxUID"),
    entry(0x0002, 0x0012, Vr::UI, "ImplementationClassUID"),
    entry(0x0002, 0x0013, Vr::SH, "ImplementationVersionName"),
    entry(0x0008, 0x0005, Vr::CS, "SpecificCharacterSet"),
    entry(0x0008, 0x0008, Vr::CS, "ImageType"),
    entry(0x0008, 0x0012, Vr::DA, "InstanceCreationDate"),
    entry(0x0008, 0x0013, Vr::TM, "InstanceCreationTime"),
    entry(0x0008, 0x0016, Vr::UI, "SOPClassUID"),
    entry(0x0008, 0x0018, Vr::UI, "SOPInstanceUID"),
    entry(0x0008, 0x0020, Vr::DA, "StudyDate"),
    entry(0x0008, 0x0021, Vr::DA, "SeriesDate"),
    entry(0x0008, 0x0022, Vr::DA, "AcquisitionDate"),
    entry(0x0008, 0x0023, Vr::DA, "ContentDate"),
    entry(0x0008, 0x0030, Vr::TM, "StudyTime"),
    entry(0x0008, 0x0031, Vr::TM, "SeriesTime"),
    entry(0x0008, 0x0032, Vr::TM, "AcquisitionTime"),
    entry(0x0008, 0x0033, Vr::TM, "ContentTime"),
    entry(0x0008, 0x0050, Vr::SH, "AccessionNumber"),
    entry(0x0008, 0x0060, Vr::CS, "Modality"),
    entry(0x0008, 0x0068, Vr::CS, "PresentationIntentType"),
    entry(0x0008, 0x0070, Vr::LO, "Manufacturer"),
    entry(0x0008, 0x0080, Vr::LO, "InstitutionName"),
    entry(0x0008, 0x0090, Vr::PN, "ReferringPhysicianName"),
    entry(0x0008, 0x1010, Vr::SH, "StationName"),
    entry(0x0008, 0x1030, Vr::LO, "StudyDescription"),
    entry(0x0008, 0x103E, Vr::LO, "SeriesDescription"),
    entry(0x0008, 0x1090, Vr::LO, "ManufacturerModelName"),
    entry(0x0008, 0x2218, Vr::SQ, "AnatomicRegionSequence"),
    entry(0x0010, 0x0010, Vr::PN, "PatientName"),
    entry(0x0010, 0x0020, Vr::LO, "PatientID"),
    entry(0x0010, 0x0030, Vr::DA, "PatientBirthDate"),
    entry(0x0010, 0x0040, Vr::CS, "PatientSex"),
    entry(0x0010, 0x1010, Vr::AS, "PatientAge"),
    entry(0x0018, 0x0015, Vr::CS, "BodyPartExamined"),
    entry(0x0018, 0x0050, Vr::DS, "SliceThickness"),
    entry(0x0018, 0x0060, Vr::DS, "KVP"),
    entry(0x0018, 0x0088, Vr::DS, "SpacingBetweenSlices"),
    entry(0x0018, 0x1020, Vr::LO, "SoftwareVersions"),
    entry(0x0018, 0x1150, Vr::IS, "ExposureTime"),
    entry(0x0018, 0x1151, Vr::IS, "XRayTubeCurrent"),
    entry(0x0018, 0x1152, Vr::IS, "Exposure"),
    entry(0x0018, 0x1164, Vr::DS, "ImagerPixelSpacing"),
    entry(0x0018, 0x5100, Vr::CS, "PatientPosition"),
    entry(0x0018, 0x5101, Vr::CS, "ViewPosition"),
    entry(0x0020, 0x000D, Vr::UI, "StudyInstanceUID"),
    entry(0x0020, 0x000E, Vr::UI, "SeriesInstanceUID"),
    entry(0x0020, 0x0010, Vr::SH, "StudyID"),
    entry(0x0020, 0x0011, Vr::IS, "SeriesNumber"),
    entry(0x0020, 0x0012, Vr::IS, "AcquisitionNumber"),
    entry(0x0020, 0x0013, Vr::IS, "InstanceNumber"),
    entry(0x0020, 0x0020, Vr::CS, "PatientOrientation"),
    entry(0x0020, 0x0032, Vr::DS, "ImagePositionPatient"),
    entry(0x0020, 0x0037, Vr::DS, "ImageOrientationPatient"),
    entry(0x0020, 0x0052, Vr::UI, "FrameOfReferenceUID"),
    entry(0x0020, 0x0060, Vr::CS, "Laterality"),
    entry(0x0020, 0x0062, Vr::CS, "ImageLaterality"),
    entry(0x0020, 0x1041, Vr::DS, "SliceLocation"),
    entry(0x0020, 0x9071, Vr::SQ, "FrameAnatomySequence"),
    entry(0x0020, 0x9072, Vr::CS, "FrameLaterality"),
    entry(0x0020, 0x9113, Vr::SQ, "PlanePositionSequence"),
    entry(0x0020, 0x9116, Vr::SQ, "PlaneOrientationSequence"),
    entry(0x0028, 0x0002, Vr::US, "SamplesPerPixel"),
    entry(0x0028, 0x0004, Vr::CS, "PhotometricInterpretation"),
    entry(0x0028, 0x0006, Vr::US, "PlanarConfiguration"),
    entry(0x0028, 0x0008, Vr::IS, "NumberOfFrames"),
    entry(0x0028, 0x0010, Vr::US, "Rows"),
    entry(0x0028, 0x0011, Vr::US, "Columns"),
    entry(0x0028, 0x0030, Vr::DS, "PixelSpacing"),
    entry(0x0028, 0x0100, Vr::US, "BitsAllocated"),
    entry(0x0028, 0x0101, Vr::US, "BitsStored"),
    entry(0x0028, 0x0102, Vr::US, "HighBit"),
    entry(0x0028, 0x0103, Vr::US, "PixelRepresentation"),
    entry(0x0028, 0x1050, Vr::DS, "WindowCenter"),
    entry(0x0028, 0x1051, Vr::DS, "WindowWidth"),
    entry(0x0028, 0x1052, Vr::DS, "RescaleIntercept"),
    entry(0x0028, 0x1053, Vr::DS, "RescaleSlope"),
    entry(0x0028, 0x1054, Vr::LO, "RescaleType"),
    entry(0x0028, 0x1055, Vr::LO, "WindowCenterWidthExplanation"),
    entry(0x0028, 0x2110, Vr::CS, "LossyImageCompression"),
    entry(0x0028, 0x9110, Vr::SQ, "PixelMeasuresSequence"),
    entry(0x0028, 0x9132, Vr::SQ, "FrameVOILUTSequence"),
    entry(0x0028, 0x9145, Vr::SQ, "PixelValueTransformationSequence"),
    entry(0x5200, 0x9229, Vr::SQ, "SharedFunctionalGroupsSequence"),
    entry(0x5200, 0x9230, Vr::SQ, "PerFrameFunctionalGroupsSequence"),
    entry(0x7FE0, 0x0010, Vr::OW, "PixelData"),
];

fn lookup(tag: Tag) -> Option<&'static Entry> {
    ENTRIES
        .binary_search_by_key(&tag, |e| e.tag)
        .ok()
        .and_then(|index| ENTRIES.get(index))
}

pub fn keyword(tag: Tag) -> Option<&'static str> {
    lookup(tag).map(|e| e.keyword)
}

/// VR for implicit-VR decoding; group lengths are always `UL`
pub fn vr(tag: Tag) -> Option<Vr> {
    if tag.element == 0x0000 {
        return Some(Vr::UL);
    }
    lookup(tag).map(|e| e.vr)
}

/// Field name: keyword when known, `GGGGEEEE` otherwise
pub fn name(tag: Tag) -> String {
    keyword(tag).map_or_else(|| tag.hex_name(), str::to_string)
}
