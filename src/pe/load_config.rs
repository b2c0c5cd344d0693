//! PE load configuration directory (`IMAGE_LOAD_CONFIG_DIRECTORY32/64`).
//!
//! Every Windows release since the SEH table was introduced has appended
//! fields to the end of this structure. The tiers below mirror those
//! releases; [`LoadConfiguration`] is decoded through the generic
//! [`VersionedRecord`] so a binary produced for an older release stays
//! readable and an unknown newer tail is carried through untouched.

use crate::exceptions::{ForgeError, Result};
use crate::record::{FieldKind, FieldSpec, Layout, RecordSchema, VersionedRecord};
use bitflags::bitflags;
use log::debug;
use std::fmt;

use crate::record::FieldKind::{Pointer as Ptr, U16, U32};

/// Load configuration tiers, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadConfigVersion {
    Base,
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    V10,
    V11,
}

impl LoadConfigVersion {
    /// Windows release that introduced the tier
    pub fn win_version(self) -> &'static str {
        match self {
            LoadConfigVersion::Base => "UNKNOWN",
            LoadConfigVersion::V0 => "SEH",
            LoadConfigVersion::V1 => "WIN_8_1",
            LoadConfigVersion::V2 => "WIN10_0_9879",
            LoadConfigVersion::V3 => "WIN10_0_14286",
            LoadConfigVersion::V4 => "WIN10_0_14383",
            LoadConfigVersion::V5 => "WIN10_0_14901",
            LoadConfigVersion::V6 => "WIN10_0_15002",
            LoadConfigVersion::V7 => "WIN10_0_16237",
            LoadConfigVersion::V8 => "WIN10_0_18362",
            LoadConfigVersion::V9 => "WIN10_0_19534",
            LoadConfigVersion::V10 => "WIN10_0_MSVC_2019",
            LoadConfigVersion::V11 => "WIN10_0_MSVC_2019_16",
        }
    }
}

impl fmt::Display for LoadConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.win_version())
    }
}

/// Every field across all tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadConfigField {
    Characteristics,
    TimeDateStamp,
    MajorVersion,
    MinorVersion,
    GlobalFlagsClear,
    GlobalFlagsSet,
    CriticalSectionDefaultTimeout,
    DecommitFreeBlockThreshold,
    DecommitTotalFreeThreshold,
    LockPrefixTable,
    MaximumAllocationSize,
    VirtualMemoryThreshold,
    ProcessAffinityMask,
    ProcessHeapFlags,
    CsdVersion,
    DependentLoadFlags,
    EditList,
    SecurityCookie,
    SeHandlerTable,
    SeHandlerCount,
    GuardCfCheckFunctionPointer,
    GuardCfDispatchFunctionPointer,
    GuardCfFunctionTable,
    GuardCfFunctionCount,
    GuardFlags,
    CodeIntegrityFlags,
    CodeIntegrityCatalog,
    CodeIntegrityCatalogOffset,
    CodeIntegrityReserved,
    GuardAddressTakenIatEntryTable,
    GuardAddressTakenIatEntryCount,
    GuardLongJumpTargetTable,
    GuardLongJumpTargetCount,
    DynamicValueRelocTable,
    HybridMetadataPointer,
    GuardRfFailureRoutine,
    GuardRfFailureRoutineFunctionPointer,
    DynamicValueRelocTableOffset,
    DynamicValueRelocTableSection,
    Reserved2,
    GuardRfVerifyStackPointerFunctionPointer,
    HotpatchTableOffset,
    Reserved3,
    EnclaveConfigurationPointer,
    VolatileMetadataPointer,
    GuardEhContinuationTable,
    GuardEhContinuationCount,
    GuardXfgCheckFunctionPointer,
    GuardXfgDispatchFunctionPointer,
    GuardXfgTableDispatchFunctionPointer,
    CastGuardOsDeterminedFailureMode,
}

impl LoadConfigField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Characteristics => "characteristics",
            Self::TimeDateStamp => "timedatestamp",
            Self::MajorVersion => "major_version",
            Self::MinorVersion => "minor_version",
            Self::GlobalFlagsClear => "global_flags_clear",
            Self::GlobalFlagsSet => "global_flags_set",
            Self::CriticalSectionDefaultTimeout => "critical_section_default_timeout",
            Self::DecommitFreeBlockThreshold => "decommit_free_block_threshold",
            Self::DecommitTotalFreeThreshold => "decommit_total_free_threshold",
            Self::LockPrefixTable => "lock_prefix_table",
            Self::MaximumAllocationSize => "maximum_allocation_size",
            Self::VirtualMemoryThreshold => "virtual_memory_threshold",
            Self::ProcessAffinityMask => "process_affinity_mask",
            Self::ProcessHeapFlags => "process_heap_flags",
            Self::CsdVersion => "csd_version",
            Self::DependentLoadFlags => "dependent_load_flags",
            Self::EditList => "editlist",
            Self::SecurityCookie => "security_cookie",
            Self::SeHandlerTable => "se_handler_table",
            Self::SeHandlerCount => "se_handler_count",
            Self::GuardCfCheckFunctionPointer => "guard_cf_check_function_pointer",
            Self::GuardCfDispatchFunctionPointer => "guard_cf_dispatch_function_pointer",
            Self::GuardCfFunctionTable => "guard_cf_function_table",
            Self::GuardCfFunctionCount => "guard_cf_function_count",
            Self::GuardFlags => "guard_flags",
            Self::CodeIntegrityFlags => "code_integrity.flags",
            Self::CodeIntegrityCatalog => "code_integrity.catalog",
            Self::CodeIntegrityCatalogOffset => "code_integrity.catalog_offset",
            Self::CodeIntegrityReserved => "code_integrity.reserved",
            Self::GuardAddressTakenIatEntryTable => "guard_address_taken_iat_entry_table",
            Self::GuardAddressTakenIatEntryCount => "guard_address_taken_iat_entry_count",
            Self::GuardLongJumpTargetTable => "guard_long_jump_target_table",
            Self::GuardLongJumpTargetCount => "guard_long_jump_target_count",
            Self::DynamicValueRelocTable => "dynamic_value_reloc_table",
            Self::HybridMetadataPointer => "hybrid_metadata_pointer",
            Self::GuardRfFailureRoutine => "guard_rf_failure_routine",
            Self::GuardRfFailureRoutineFunctionPointer => "guard_rf_failure_routine_function_pointer",
            Self::DynamicValueRelocTableOffset => "dynamic_value_reloctable_offset",
            Self::DynamicValueRelocTableSection => "dynamic_value_reloctable_section",
            Self::Reserved2 => "reserved2",
            Self::GuardRfVerifyStackPointerFunctionPointer => {
                "guard_rf_verify_stackpointer_function_pointer"
            }
            Self::HotpatchTableOffset => "hotpatch_table_offset",
            Self::Reserved3 => "reserved3",
            Self::EnclaveConfigurationPointer => "enclave_configuration_pointer",
            Self::VolatileMetadataPointer => "volatile_metadata_pointer",
            Self::GuardEhContinuationTable => "guard_eh_continuation_table",
            Self::GuardEhContinuationCount => "guard_eh_continuation_count",
            Self::GuardXfgCheckFunctionPointer => "guard_xfg_check_function_pointer",
            Self::GuardXfgDispatchFunctionPointer => "guard_xfg_dispatch_function_pointer",
            Self::GuardXfgTableDispatchFunctionPointer => "guard_xfg_table_dispatch_function_pointer",
            Self::CastGuardOsDeterminedFailureMode => "cast_guard_os_determined_failure_mode",
        }
    }
}

impl fmt::Display for LoadConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

use LoadConfigField as F;
use LoadConfigVersion as V;

const fn spec(field: F, version: V, kind: FieldKind) -> FieldSpec<F, V> {
    FieldSpec::new(field, version, kind)
}

// IMAGE_LOAD_CONFIG_DIRECTORY32: heap flags precede the affinity mask.
const FIELDS_PE32: &[FieldSpec<F, V>] = &[
    spec(F::Characteristics, V::Base, U32),
    spec(F::TimeDateStamp, V::Base, U32),
    spec(F::MajorVersion, V::Base, U16),
    spec(F::MinorVersion, V::Base, U16),
    spec(F::GlobalFlagsClear, V::Base, U32),
    spec(F::GlobalFlagsSet, V::Base, U32),
    spec(F::CriticalSectionDefaultTimeout, V::Base, U32),
    spec(F::DecommitFreeBlockThreshold, V::Base, Ptr),
    spec(F::DecommitTotalFreeThreshold, V::Base, Ptr),
    spec(F::LockPrefixTable, V::Base, Ptr),
    spec(F::MaximumAllocationSize, V::Base, Ptr),
    spec(F::VirtualMemoryThreshold, V::Base, Ptr),
    spec(F::ProcessHeapFlags, V::Base, U32),
    spec(F::ProcessAffinityMask, V::Base, Ptr),
    spec(F::CsdVersion, V::Base, U16),
    spec(F::DependentLoadFlags, V::Base, U16),
    spec(F::EditList, V::Base, Ptr),
    spec(F::SecurityCookie, V::Base, Ptr),
    spec(F::SeHandlerTable, V::V0, Ptr),
    spec(F::SeHandlerCount, V::V0, Ptr),
    spec(F::GuardCfCheckFunctionPointer, V::V1, Ptr),
    spec(F::GuardCfDispatchFunctionPointer, V::V1, Ptr),
    spec(F::GuardCfFunctionTable, V::V1, Ptr),
    spec(F::GuardCfFunctionCount, V::V1, Ptr),
    spec(F::GuardFlags, V::V1, U32),
    spec(F::CodeIntegrityFlags, V::V2, U16),
    spec(F::CodeIntegrityCatalog, V::V2, U16),
    spec(F::CodeIntegrityCatalogOffset, V::V2, U32),
    spec(F::CodeIntegrityReserved, V::V2, U32),
    spec(F::GuardAddressTakenIatEntryTable, V::V3, Ptr),
    spec(F::GuardAddressTakenIatEntryCount, V::V3, Ptr),
    spec(F::GuardLongJumpTargetTable, V::V3, Ptr),
    spec(F::GuardLongJumpTargetCount, V::V3, Ptr),
    spec(F::DynamicValueRelocTable, V::V4, Ptr),
    spec(F::HybridMetadataPointer, V::V4, Ptr),
    spec(F::GuardRfFailureRoutine, V::V5, Ptr),
    spec(F::GuardRfFailureRoutineFunctionPointer, V::V5, Ptr),
    spec(F::DynamicValueRelocTableOffset, V::V5, U32),
    spec(F::DynamicValueRelocTableSection, V::V5, U16),
    spec(F::Reserved2, V::V5, U16),
    spec(F::GuardRfVerifyStackPointerFunctionPointer, V::V6, Ptr),
    spec(F::HotpatchTableOffset, V::V6, U32),
    spec(F::Reserved3, V::V7, U32),
    spec(F::EnclaveConfigurationPointer, V::V7, Ptr),
    spec(F::VolatileMetadataPointer, V::V8, Ptr),
    spec(F::GuardEhContinuationTable, V::V9, Ptr),
    spec(F::GuardEhContinuationCount, V::V9, Ptr),
    spec(F::GuardXfgCheckFunctionPointer, V::V10, Ptr),
    spec(F::GuardXfgDispatchFunctionPointer, V::V10, Ptr),
    spec(F::GuardXfgTableDispatchFunctionPointer, V::V10, Ptr),
    spec(F::CastGuardOsDeterminedFailureMode, V::V11, Ptr),
];

const FIELDS_PE64: &[FieldSpec<F, V>] = &[
    spec(F::Characteristics, V::Base, U32),
    spec(F::TimeDateStamp, V::Base, U32),
    spec(F::MajorVersion, V::Base, U16),
    spec(F::MinorVersion, V::Base, U16),
    spec(F::GlobalFlagsClear, V::Base, U32),
    spec(F::GlobalFlagsSet, V::Base, U32),
    spec(F::CriticalSectionDefaultTimeout, V::Base, U32),
    spec(F::DecommitFreeBlockThreshold, V::Base, Ptr),
    spec(F::DecommitTotalFreeThreshold, V::Base, Ptr),
    spec(F::LockPrefixTable, V::Base, Ptr),
    spec(F::MaximumAllocationSize, V::Base, Ptr),
    spec(F::VirtualMemoryThreshold, V::Base, Ptr),
    spec(F::ProcessAffinityMask, V::Base, Ptr),
    spec(F::ProcessHeapFlags, V::Base, U32),
    spec(F::CsdVersion, V::Base, U16),
    spec(F::DependentLoadFlags, V::Base, U16),
    spec(F::EditList, V::Base, Ptr),
    spec(F::SecurityCookie, V::Base, Ptr),
    spec(F::SeHandlerTable, V::V0, Ptr),
    spec(F::SeHandlerCount, V::V0, Ptr),
    spec(F::GuardCfCheckFunctionPointer, V::V1, Ptr),
    spec(F::GuardCfDispatchFunctionPointer, V::V1, Ptr),
    spec(F::GuardCfFunctionTable, V::V1, Ptr),
    spec(F::GuardCfFunctionCount, V::V1, Ptr),
    spec(F::GuardFlags, V::V1, U32),
    spec(F::CodeIntegrityFlags, V::V2, U16),
    spec(F::CodeIntegrityCatalog, V::V2, U16),
    spec(F::CodeIntegrityCatalogOffset, V::V2, U32),
    spec(F::CodeIntegrityReserved, V::V2, U32),
    spec(F::GuardAddressTakenIatEntryTable, V::V3, Ptr),
    spec(F::GuardAddressTakenIatEntryCount, V::V3, Ptr),
    spec(F::GuardLongJumpTargetTable, V::V3, Ptr),
    spec(F::GuardLongJumpTargetCount, V::V3, Ptr),
    spec(F::DynamicValueRelocTable, V::V4, Ptr),
    spec(F::HybridMetadataPointer, V::V4, Ptr),
    spec(F::GuardRfFailureRoutine, V::V5, Ptr),
    spec(F::GuardRfFailureRoutineFunctionPointer, V::V5, Ptr),
    spec(F::DynamicValueRelocTableOffset, V::V5, U32),
    spec(F::DynamicValueRelocTableSection, V::V5, U16),
    spec(F::Reserved2, V::V5, U16),
    spec(F::GuardRfVerifyStackPointerFunctionPointer, V::V6, Ptr),
    spec(F::HotpatchTableOffset, V::V6, U32),
    spec(F::Reserved3, V::V7, U32),
    spec(F::EnclaveConfigurationPointer, V::V7, Ptr),
    spec(F::VolatileMetadataPointer, V::V8, Ptr),
    spec(F::GuardEhContinuationTable, V::V9, Ptr),
    spec(F::GuardEhContinuationCount, V::V9, Ptr),
    spec(F::GuardXfgCheckFunctionPointer, V::V10, Ptr),
    spec(F::GuardXfgDispatchFunctionPointer, V::V10, Ptr),
    spec(F::GuardXfgTableDispatchFunctionPointer, V::V10, Ptr),
    spec(F::CastGuardOsDeterminedFailureMode, V::V11, Ptr),
];

/// Schema marker for the load configuration family
#[derive(Debug)]
pub struct LoadConfigSchema;

impl RecordSchema for LoadConfigSchema {
    type Version = LoadConfigVersion;
    type Field = LoadConfigField;
    const NAME: &'static str = "LoadConfiguration";

    fn versions() -> &'static [LoadConfigVersion] {
        &[
            V::Base,
            V::V0,
            V::V1,
            V::V2,
            V::V3,
            V::V4,
            V::V5,
            V::V6,
            V::V7,
            V::V8,
            V::V9,
            V::V10,
            V::V11,
        ]
    }

    fn fields(layout: Layout) -> &'static [FieldSpec<F, V>] {
        match layout {
            Layout::Pe32 => FIELDS_PE32,
            Layout::Pe64 => FIELDS_PE64,
        }
    }
}

/// Decoded load configuration directory
pub type LoadConfiguration = VersionedRecord<LoadConfigSchema>;

bitflags! {
    /// `IMAGE_GUARD_*` bits of `GuardFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GuardFlags: u32 {
        const CF_INSTRUMENTED = 0x0000_0100;
        const CFW_INSTRUMENTED = 0x0000_0200;
        const CF_FUNCTION_TABLE_PRESENT = 0x0000_0400;
        const SECURITY_COOKIE_UNUSED = 0x0000_0800;
        const PROTECT_DELAYLOAD_IAT = 0x0000_1000;
        const DELAYLOAD_IAT_IN_ITS_OWN_SECTION = 0x0000_2000;
        const CF_EXPORT_SUPPRESSION_INFO_PRESENT = 0x0000_4000;
        const CF_ENABLE_EXPORT_SUPPRESSION = 0x0000_8000;
        const CF_LONGJUMP_TABLE_PRESENT = 0x0001_0000;
        const RF_INSTRUMENTED = 0x0002_0000;
        const RF_ENABLE = 0x0004_0000;
        const RF_STRICT = 0x0008_0000;
        const RETPOLINE_PRESENT = 0x0010_0000;
        const EH_CONTINUATION_TABLE_PRESENT = 0x0040_0000;
        const XFG_ENABLED = 0x0080_0000;
        const CASTGUARD_PRESENT = 0x0100_0000;
        const MEMCPY_PRESENT = 0x0200_0000;
    }
}

/// `IMAGE_LOAD_CONFIG_CODE_INTEGRITY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeIntegrity {
    pub flags: u16,
    pub catalog: u16,
    pub catalog_offset: u32,
    pub reserved: u32,
}

/// Decode the directory found at the start of `bytes`.
///
/// The structure's own leading `Size` field is the declared size; it is
/// clamped to the bytes the image actually holds.
pub fn decode_load_config(bytes: &[u8], layout: Layout) -> Result<LoadConfiguration> {
    let size_field = bytes
        .get(0..4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(u32::from_le_bytes)
        .ok_or(ForgeError::TruncatedRecord {
            record: LoadConfigSchema::NAME,
            needed: LoadConfigSchema::min_size(layout),
            available: bytes.len(),
        })?;

    debug!(
        "Load config size field: {} bytes ({} available, layout {:?})",
        size_field,
        bytes.len(),
        layout
    );
    LoadConfiguration::decode(bytes, size_field as usize, layout)
}

impl VersionedRecord<LoadConfigSchema> {
    fn base(&self, field: LoadConfigField) -> u64 {
        self.get(field).unwrap_or_default()
    }

    fn newer(&self, field: LoadConfigField) -> Option<u64> {
        self.get(field).ok()
    }

    /// The `Size` field as written in the image
    pub fn characteristics(&self) -> u32 {
        self.base(F::Characteristics) as u32
    }

    pub fn timedatestamp(&self) -> u32 {
        self.base(F::TimeDateStamp) as u32
    }

    pub fn major_version(&self) -> u16 {
        self.base(F::MajorVersion) as u16
    }

    pub fn minor_version(&self) -> u16 {
        self.base(F::MinorVersion) as u16
    }

    pub fn security_cookie(&self) -> u64 {
        self.base(F::SecurityCookie)
    }

    pub fn set_security_cookie(&mut self, value: u64) -> Result<()> {
        self.set(F::SecurityCookie, value)
    }

    pub fn process_heap_flags(&self) -> u32 {
        self.base(F::ProcessHeapFlags) as u32
    }

    pub fn se_handler_table(&self) -> Option<u64> {
        self.newer(F::SeHandlerTable)
    }

    pub fn se_handler_count(&self) -> Option<u64> {
        self.newer(F::SeHandlerCount)
    }

    pub fn guard_cf_function_table(&self) -> Option<u64> {
        self.newer(F::GuardCfFunctionTable)
    }

    pub fn guard_cf_function_count(&self) -> Option<u64> {
        self.newer(F::GuardCfFunctionCount)
    }

    /// Known guard bits; unknown bits are dropped
    pub fn guard_flags(&self) -> Option<GuardFlags> {
        self.newer(F::GuardFlags)
            .map(|raw| GuardFlags::from_bits_truncate(raw as u32))
    }

    pub fn set_guard_flags(&mut self, flags: GuardFlags) -> Result<()> {
        self.set(F::GuardFlags, u64::from(flags.bits()))
    }

    pub fn code_integrity(&self) -> Option<CodeIntegrity> {
        Some(CodeIntegrity {
            flags: self.newer(F::CodeIntegrityFlags)? as u16,
            catalog: self.newer(F::CodeIntegrityCatalog)? as u16,
            catalog_offset: self.newer(F::CodeIntegrityCatalogOffset)? as u32,
            reserved: self.newer(F::CodeIntegrityReserved)? as u32,
        })
    }

    pub fn dynamic_value_reloc_table(&self) -> Option<u64> {
        self.newer(F::DynamicValueRelocTable)
    }

    pub fn hybrid_metadata_pointer(&self) -> Option<u64> {
        self.newer(F::HybridMetadataPointer)
    }

    pub fn guard_rf_failure_routine(&self) -> Option<u64> {
        self.newer(F::GuardRfFailureRoutine)
    }

    pub fn hotpatch_table_offset(&self) -> Option<u32> {
        self.newer(F::HotpatchTableOffset).map(|v| v as u32)
    }

    pub fn enclave_configuration_pointer(&self) -> Option<u64> {
        self.newer(F::EnclaveConfigurationPointer)
    }

    pub fn volatile_metadata_pointer(&self) -> Option<u64> {
        self.newer(F::VolatileMetadataPointer)
    }

    pub fn guard_eh_continuation_table(&self) -> Option<u64> {
        self.newer(F::GuardEhContinuationTable)
    }

    pub fn guard_xfg_check_function_pointer(&self) -> Option<u64> {
        self.newer(F::GuardXfgCheckFunctionPointer)
    }

    pub fn cast_guard_os_determined_failure_mode(&self) -> Option<u64> {
        self.newer(F::CastGuardOsDeterminedFailureMode)
    }
}
