use crate::define_id_enum;

define_id_enum! {
    /// Technology category of a repository, as reported by the analyzer
    StackId {
        Static => "static" : "Static HTML" | "html" | "static-site",
        React => "react" : "React" | "create-react-app" | "vite-react",
        Vue => "vue" : "Vue" | "vuejs" | "vue.js",
        NextJs => "nextjs" : "Next.js" | "next" | "next.js",
        Gatsby => "gatsby" : "Gatsby",
    }
}
