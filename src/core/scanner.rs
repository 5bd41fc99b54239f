//! 文件扫描模块
//!
//! 负责发现模型文件和待入库的原始文档。
//! 此模块只做IO操作，不做任何解析。

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 查找目录下的 JSON 文件（排序后返回）
///
/// 目录不存在时只记录警告并返回空列表。
pub fn find_json_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    if !dir.exists() {
        tracing::warn!("目录不存在: {}", dir.display());
        return Vec::new();
    }

    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("扫描文件时出错: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();

    files.sort();
    files
}

/// 文件扫描器
pub struct FileScanner {
    /// 扫描根路径
    root_path: PathBuf,
    /// 是否包含隐藏文件
    include_hidden: bool,
    /// 最大扫描深度（0表示无限）
    max_depth: usize,
}

impl FileScanner {
    /// 创建新的扫描器
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            include_hidden: false,
            max_depth: 0,
        }
    }

    /// 设置是否包含隐藏文件
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// 设置最大扫描深度
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// 执行扫描，返回所有普通文件
    pub fn scan(&self) -> Vec<PathBuf> {
        if !self.root_path.exists() {
            tracing::warn!("扫描目录不存在: {}", self.root_path.display());
            return Vec::new();
        }

        let walker = if self.max_depth > 0 {
            WalkDir::new(&self.root_path).max_depth(self.max_depth)
        } else {
            WalkDir::new(&self.root_path)
        };

        let mut files = Vec::new();
        for entry in walker.into_iter().filter_entry(|e| self.should_include(e)) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("扫描文件时出错: {}", e);
                }
            }
        }

        files.sort();
        tracing::info!("扫描完成，共发现 {} 个文件", files.len());
        files
    }

    /// 判断是否应该包含此条目
    fn should_include(&self, entry: &walkdir::DirEntry) -> bool {
        // 根目录必须允许遍历，否则 filter_entry 会直接阻止深入扫描
        if entry.path() == self.root_path {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        self.include_hidden || !name.starts_with('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_find_json_files_non_recursive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.JSON"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.json"), "{}").unwrap();

        let files = find_json_files(dir.path(), false);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);

        let all = find_json_files(dir.path(), true);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_find_json_files_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(find_json_files(&dir.path().join("missing"), true).is_empty());
    }

    #[test]
    fn test_scanner_skips_hidden() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("report.pdf"), "x").unwrap();
        fs::write(dir.path().join(".DS_Store"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/photo.jpg"), "x").unwrap();

        let files = FileScanner::new(dir.path().to_path_buf()).scan();
        assert_eq!(files.len(), 2);

        let files = FileScanner::new(dir.path().to_path_buf())
            .include_hidden(true)
            .scan();
        assert_eq!(files.len(), 3);

        let files = FileScanner::new(dir.path().to_path_buf()).max_depth(1).scan();
        assert_eq!(files.len(), 1);
    }
}
